//! Application layer for HQ.
//!
//! # Sub-modules
//!
//! - **`session_registry`** – The in-memory set of admitted sessions and the
//!   per-session write handle.
//!
//! - **`relay`** – The [`Relay`](relay::Relay) object: admission, fan-out with
//!   per-write timeouts, kick and ban.  It owns the registry and the
//!   moderation policy behind one lock.
//!
//! Nothing here opens sockets.  Sessions are handed in as boxed writers, which
//! is what lets the tests drive the relay with in-memory pipes.

pub mod relay;
pub mod session_registry;
