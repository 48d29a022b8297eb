//! Password-derived authenticated encryption.
//!
//! Every payload that crosses the wire is sealed with XChaCha20-Poly1305
//! under a key derived from the session password.  Both ends of a session
//! derive the key independently, so the password itself never travels.
//!
//! # Sealed layout
//!
//! ```text
//! [nonce:24][ciphertext:N][tag:16]
//! ```
//!
//! The nonce is drawn from the OS RNG on every call.  Sealing the same
//! plaintext twice therefore yields two unrelated byte strings, which is what
//! lets HQ retransmit its beacon without producing a recognisable pattern.
//!
//! # Key derivation
//!
//! HKDF-SHA256 with a fixed application salt and info label.  The derivation
//! is deterministic: the same password produces the same 32-byte key on every
//! machine.

use std::fmt;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of the derived symmetric key in bytes.
pub const KEY_SIZE: usize = 32;

/// Length of the XChaCha20 nonce prepended to every sealed payload.
pub const NONCE_SIZE: usize = 24;

/// Length of the Poly1305 authentication tag.
pub const TAG_SIZE: usize = 16;

const KDF_SALT: &[u8] = b"shield-relay/kdf/v1";
const KDF_INFO: &[u8] = b"shield-relay session key";

/// Errors produced by the cipher layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    /// The key could not be expanded from the password.
    #[error("key derivation failed")]
    KeyDerivation,

    /// The AEAD refused to encrypt the payload.
    #[error("encryption failed")]
    SealFailed,

    /// The sealed payload is shorter than a nonce plus tag.
    #[error("sealed payload too short: {0} bytes")]
    Truncated(usize),

    /// Authentication failed: wrong key, tampered bytes, or garbage input.
    #[error("payload failed authentication")]
    BadCipher,
}

/// A 256-bit symmetric key derived from the session password.
///
/// The bytes are wiped from memory when the key is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    /// Wraps raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Derives the session key for `password`.
///
/// # Errors
///
/// Returns [`CipherError::KeyDerivation`] if HKDF rejects the output length,
/// which cannot happen for a 32-byte key but is propagated rather than
/// unwrapped.
///
/// # Examples
///
/// ```rust
/// use shield_core::crypto::derive;
///
/// let a = derive("ALPHA-77").unwrap();
/// let b = derive("ALPHA-77").unwrap();
/// assert_eq!(a, b);
/// ```
pub fn derive(password: &str) -> Result<SessionKey, CipherError> {
    let hk = Hkdf::<Sha256>::new(Some(KDF_SALT), password.as_bytes());
    let mut okm = [0u8; KEY_SIZE];
    hk.expand(KDF_INFO, &mut okm)
        .map_err(|_| CipherError::KeyDerivation)?;
    Ok(SessionKey(okm))
}

/// Encrypts and authenticates `plaintext` under `key`.
///
/// # Errors
///
/// Returns [`CipherError::SealFailed`] if the AEAD reports an error.
pub fn seal(key: &SessionKey, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CipherError::SealFailed)?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Verifies and decrypts a payload produced by [`seal`].
///
/// # Errors
///
/// - [`CipherError::Truncated`] when the input cannot hold a nonce and tag.
/// - [`CipherError::BadCipher`] when authentication fails.
pub fn open(key: &SessionKey, sealed: &[u8]) -> Result<Vec<u8>, CipherError> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CipherError::Truncated(sealed.len()));
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CipherError::BadCipher)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
