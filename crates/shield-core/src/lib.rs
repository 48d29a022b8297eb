//! # shield-core
//!
//! Shared library for Shield Relay containing the cipher envelope, wire
//! framing, the handshake state machine, and the moderation rules.
//!
//! This crate is used by both HQ and the agent.  It has no terminal, config
//! file, or logging-subscriber concerns; those belong to the binaries.
//!
//! # Architecture overview (for beginners)
//!
//! Shield Relay is a small authenticated chat relay.  Agents dial HQ over TCP,
//! prove they know the shared password, and from then on every line an agent
//! sends is forwarded by HQ to every other agent.
//!
//! - **`crypto`** – Derives a 32-byte key from the password and seals/opens
//!   payloads with XChaCha20-Poly1305.
//!
//! - **`net`** – Resolves user-typed addresses, dials and listens, and reads
//!   and writes newline-terminated frames with per-phase timeouts.
//!
//! - **`protocol`** – The frame envelope, the handshake tokens and state
//!   machines, and the decoded [`Message`] kinds.
//!
//! - **`domain`** – Failed-attempt counting, bans, and display identities.

pub mod crypto;
pub mod domain;
pub mod net;
pub mod protocol;

// Re-export the most-used types at the crate root.
pub use crypto::{CipherError, SessionKey};
pub use domain::{Admission, IdentityCounter, ModerationPolicy};
pub use net::{resolve_address, AddressError, FrameReader, NetError, ResolvedAddress, DEFAULT_PORT};
pub use protocol::{
    accept_handshake, initiate_handshake, AcceptorOutcome, Envelope, EnvelopeError,
    HandshakeConfig, HandshakeError, InitiatorOutcome, Message,
};
