//! Network infrastructure for HQ.
//!
//! # Sub-modules
//!
//! - **`server`** – The accept loop and the per-connection task: ban check,
//!   acceptor handshake, admission, and the relay read loop.

pub mod server;

pub use server::run_server;
