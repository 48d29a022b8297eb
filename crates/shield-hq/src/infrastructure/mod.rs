//! Infrastructure layer for HQ.
//!
//! Contains the OS-facing adapters: the TCP server, the config file, and the
//! moderator console on stdin.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `shield_core`, but MUST NOT be imported by the `application` layer.

pub mod console;
pub mod network;
pub mod storage;
