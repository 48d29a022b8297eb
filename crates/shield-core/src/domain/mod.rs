//! Domain rules for HQ: moderation policy and session identities.
//!
//! Nothing here performs I/O.  Both modules are plain data plus rules, so HQ
//! can keep them behind its relay lock and tests can drive them directly.

pub mod identity;
pub mod moderation;

pub use identity::{default_identity, sanitize_client_name, IdentityCounter};
pub use moderation::{Admission, ModerationPolicy, ModerationRecord, BAN_THRESHOLD};
