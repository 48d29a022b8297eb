//! Frame envelope: how a plaintext payload becomes one line on the wire.
//!
//! Wire format for the default sealed mode:
//! ```text
//! base64url_nopad([nonce:24][ciphertext:N][tag:16]) '\n'
//! ```
//!
//! The base64 alphabet never contains `\n`, so a newline is an unambiguous
//! frame terminator and a frame mangled in transit (for instance by a tunnel
//! that swallows the first bytes of a fresh stream) only costs that one line.
//!
//! A plaintext mode exists for debugging against a packet capture.  It provides
//! no confidentiality and no authentication and must be selected explicitly.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use thiserror::Error;

use crate::crypto::{self, CipherError, SessionKey};

/// Errors produced while wrapping or unwrapping a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The frame body was not valid base64.
    #[error("frame is not valid base64")]
    Encoding,

    /// The sealed bytes failed to open.
    #[error(transparent)]
    Cipher(#[from] CipherError),

    /// A plaintext payload contained a newline and cannot be framed.
    #[error("plaintext payload contains a line terminator")]
    EmbeddedNewline,
}

impl EnvelopeError {
    /// Whether this error means "not for us" (wrong key, corruption) rather
    /// than a local fault.
    pub fn is_bad_cipher(&self) -> bool {
        matches!(
            self,
            EnvelopeError::Encoding
                | EnvelopeError::Cipher(CipherError::BadCipher)
                | EnvelopeError::Cipher(CipherError::Truncated(_))
        )
    }
}

/// The seal/open mode applied to every frame of a session.
#[derive(Debug, Clone)]
pub enum Envelope {
    /// Authenticated encryption under a password-derived key.
    Sealed(SessionKey),
    /// No protection at all.  Debugging only.
    Plaintext,
}

impl Envelope {
    /// Builds the default sealed envelope for `password`.
    ///
    /// # Errors
    ///
    /// Propagates key-derivation failure.
    pub fn sealed(password: &str) -> Result<Self, CipherError> {
        Ok(Envelope::Sealed(crypto::derive(password)?))
    }

    /// Returns `true` unless this is the plaintext debugging mode.
    pub fn is_sealed(&self) -> bool {
        matches!(self, Envelope::Sealed(_))
    }

    /// Turns `plaintext` into a frame body (without the trailing newline).
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::EmbeddedNewline`] in plaintext mode when the
    /// payload would split into two frames, or a cipher error when sealing
    /// fails.
    pub fn seal_frame(&self, plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        match self {
            Envelope::Sealed(key) => {
                let sealed = crypto::seal(key, plaintext)?;
                Ok(URL_SAFE_NO_PAD.encode(sealed).into_bytes())
            }
            Envelope::Plaintext => {
                if plaintext.contains(&b'\n') {
                    return Err(EnvelopeError::EmbeddedNewline);
                }
                Ok(plaintext.to_vec())
            }
        }
    }

    /// Recovers the plaintext from a frame body.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Encoding`] or a cipher error when the frame
    /// was not sealed under this envelope's key.
    pub fn open_frame(&self, body: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        match self {
            Envelope::Sealed(key) => {
                let sealed = URL_SAFE_NO_PAD
                    .decode(body)
                    .map_err(|_| EnvelopeError::Encoding)?;
                Ok(crypto::open(key, &sealed)?)
            }
            Envelope::Plaintext => Ok(body.to_vec()),
        }
    }

    /// Convenience wrapper around [`open_frame`](Self::open_frame) that also
    /// decodes the plaintext as UTF-8.  Invalid sequences become U+FFFD
    /// rather than failing the frame.
    pub fn open_text(&self, body: &[u8]) -> Result<String, EnvelopeError> {
        let plain = self.open_frame(body)?;
        Ok(String::from_utf8_lossy(&plain).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sealed_frame_contains_no_newline() {
        let env = Envelope::sealed("ALPHA-77").unwrap();
        let body = env.seal_frame(b"line one\nline two").unwrap();
        assert!(!body.contains(&b'\n'));
    }

    #[test]
    fn test_sealed_frame_opens_under_same_password() {
        let tx = Envelope::sealed("ALPHA-77").unwrap();
        let rx = Envelope::sealed("ALPHA-77").unwrap();
        let body = tx.seal_frame(b"hello team").unwrap();
        assert_eq!(rx.open_text(&body).unwrap(), "hello team");
    }

    #[test]
    fn test_sealed_frame_rejected_under_other_password() {
        let tx = Envelope::sealed("ALPHA-77").unwrap();
        let rx = Envelope::sealed("WRONG").unwrap();
        let body = tx.seal_frame(b"hello").unwrap();
        let err = rx.open_frame(&body).unwrap_err();
        assert!(err.is_bad_cipher(), "got {err:?}");
    }

    #[test]
    fn test_garbage_frame_is_bad_cipher() {
        let env = Envelope::sealed("ALPHA-77").unwrap();
        let err = env.open_frame(b"not base64 at all!!").unwrap_err();
        assert_eq!(err, EnvelopeError::Encoding);
        assert!(err.is_bad_cipher());
    }

    #[test]
    fn test_plaintext_mode_passes_bytes_through() {
        let env = Envelope::Plaintext;
        assert!(!env.is_sealed());
        let body = env.seal_frame(b"AUTH_REQUEST").unwrap();
        assert_eq!(body, b"AUTH_REQUEST");
        assert_eq!(env.open_frame(&body).unwrap(), b"AUTH_REQUEST");
    }

    #[test]
    fn test_plaintext_mode_rejects_embedded_newline() {
        let env = Envelope::Plaintext;
        assert_eq!(
            env.seal_frame(b"a\nb"),
            Err(EnvelopeError::EmbeddedNewline)
        );
    }

    #[test]
    fn test_open_text_replaces_invalid_utf8() {
        // Arrange
        let env = Envelope::sealed("ALPHA-77").unwrap();
        let body = env.seal_frame(b"ok \xff\xfe end").unwrap();

        // Act
        let text = env.open_text(&body).unwrap();

        // Assert
        assert_eq!(text, "ok \u{FFFD}\u{FFFD} end");
    }
}
