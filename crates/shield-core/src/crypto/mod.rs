//! Symmetric cipher used for every frame on the wire.

pub mod cipher;

pub use cipher::{derive, open, seal, CipherError, SessionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
