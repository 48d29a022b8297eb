//! Display identities for admitted sessions.
//!
//! HQ names every session `AGENT_<n>`: for IPv4 peers `n` is the last octet
//! of the source address, otherwise `n` comes from an [`IdentityCounter`].
//! An agent may offer its own name in the acknowledgement; HQ adopts it only
//! when [`sanitize_client_name`] accepts it.
//!
//! Identities are not unique.  Two agents behind the same NAT, or two agents
//! offering the same name, share a label; kicking by name removes all of them.
//!
//! # Thread safety
//!
//! The counter is an `AtomicU64`, so connection tasks can draw numbers
//! concurrently without holding the relay lock.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Prefix of generated identities.
pub const IDENTITY_PREFIX: &str = "AGENT_";

/// Longest client-supplied name HQ will adopt.
pub const MAX_CLIENT_NAME_LEN: usize = 32;

/// Monotonic source of identity numbers for peers without an IPv4 octet.
///
/// The first call to [`next`](Self::next) returns 1.
///
/// # Examples
///
/// ```rust
/// use shield_core::domain::IdentityCounter;
///
/// let counter = IdentityCounter::new();
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.next(), 2);
/// ```
#[derive(Debug)]
pub struct IdentityCounter {
    inner: AtomicU64,
}

impl IdentityCounter {
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(1),
        }
    }

    /// Returns the next number.  `Relaxed` is enough: the value is a label,
    /// not a synchronisation point.
    pub fn next(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdentityCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Generates the default identity for a peer at `addr`.
pub fn default_identity(addr: IpAddr, counter: &IdentityCounter) -> String {
    match addr {
        IpAddr::V4(v4) => format!("{IDENTITY_PREFIX}{}", v4.octets()[3]),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => format!("{IDENTITY_PREFIX}{}", v4.octets()[3]),
            None => format!("{IDENTITY_PREFIX}{}", counter.next()),
        },
    }
}

/// Returns the trimmed name if it is 1 to [`MAX_CLIENT_NAME_LEN`] characters
/// of ASCII alphanumerics, `-` or `_`.
pub fn sanitize_client_name(raw: &str) -> Option<String> {
    let name = raw.trim();
    let valid = !name.is_empty()
        && name.len() <= MAX_CLIENT_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then(|| name.to_string())
}
