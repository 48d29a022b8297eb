//! Turns whatever the user typed into a dialable host and port.
//!
//! Accepted shapes:
//!
//! ```text
//! 10.0.0.5                 -> 10.0.0.5 : 9000
//! 10.0.0.5:8080            -> 10.0.0.5 : 8080
//! tcp://10.0.0.5:8080      -> 10.0.0.5 : 8080
//! [fe80::1]:7000           -> fe80::1  : 7000
//! fe80::1%eth0:7000        -> fe80::1%eth0 : 7000
//! fe80::1                  -> fe80::1  : 9000
//! relay.example.org        -> relay.example.org : 9000
//! ```
//!
//! The rule is: after trimming and stripping a known scheme, a final
//! `:`-delimited run of digits is the port and everything before it is the
//! host.  A host that ends in `:` at that point was really a bare IPv6
//! literal (`::1`, `fe80::1`) and is kept whole with the default port.

use std::fmt;

use thiserror::Error;

/// Port used when the address carries none.
pub const DEFAULT_PORT: u16 = 9000;

/// Scheme prefixes stripped before parsing.  Compared case-insensitively.
const KNOWN_SCHEMES: &[&str] = &["tcp://", "shield://", "http://", "https://", "ws://", "wss://"];

/// An address string that could not be understood.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    /// Nothing left once whitespace and scheme were removed.
    #[error("address `{input}` has no host")]
    Empty { input: String },

    /// The port segment is not a number in 1..=65535.
    #[error("address `{input}` has an invalid port `{segment}`")]
    BadPort { input: String, segment: String },
}

/// A resolved dial target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for ResolvedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parses `raw` into a host and port, falling back to [`DEFAULT_PORT`].
///
/// # Errors
///
/// - [`AddressError::Empty`] when no host remains.
/// - [`AddressError::BadPort`] when a port segment is present but invalid.
///
/// # Examples
///
/// ```rust
/// use shield_core::net::{resolve_address, DEFAULT_PORT};
///
/// let a = resolve_address("tcp://10.0.0.5:8080").unwrap();
/// assert_eq!((a.host.as_str(), a.port), ("10.0.0.5", 8080));
///
/// let b = resolve_address("10.0.0.5").unwrap();
/// assert_eq!(b.port, DEFAULT_PORT);
/// ```
pub fn resolve_address(raw: &str) -> Result<ResolvedAddress, AddressError> {
    let input = raw.to_string();
    let rest = strip_scheme(raw.trim()).trim_end_matches('/');

    let empty = || AddressError::Empty {
        input: input.clone(),
    };
    let bad_port = |segment: &str| AddressError::BadPort {
        input: input.clone(),
        segment: segment.to_string(),
    };

    if rest.is_empty() {
        return Err(empty());
    }

    // Bracketed literal: `[host]` or `[host]:port`.
    if let Some(inner) = rest.strip_prefix('[') {
        let (host, tail) = inner.split_once(']').ok_or_else(|| bad_port(rest))?;
        if host.is_empty() {
            return Err(empty());
        }
        let port = match tail {
            "" => DEFAULT_PORT,
            _ => {
                let segment = tail.strip_prefix(':').ok_or_else(|| bad_port(tail))?;
                parse_port(segment).ok_or_else(|| bad_port(segment))?
            }
        };
        return Ok(ResolvedAddress {
            host: host.to_string(),
            port,
        });
    }

    let Some((host, segment)) = rest.rsplit_once(':') else {
        return Ok(ResolvedAddress {
            host: rest.to_string(),
            port: DEFAULT_PORT,
        });
    };

    let numeric = !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit());

    if numeric && !host.ends_with(':') {
        if host.is_empty() {
            return Err(empty());
        }
        let port = parse_port(segment).ok_or_else(|| bad_port(segment))?;
        return Ok(ResolvedAddress {
            host: host.to_string(),
            port,
        });
    }

    // Several colons and no usable port: a bare IPv6 literal.
    if host.contains(':') {
        return Ok(ResolvedAddress {
            host: rest.to_string(),
            port: DEFAULT_PORT,
        });
    }

    Err(bad_port(segment))
}

fn strip_scheme(s: &str) -> &str {
    for scheme in KNOWN_SCHEMES {
        let matches = s
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme));
        if matches {
            return &s[scheme.len()..];
        }
    }
    s
}

fn parse_port(segment: &str) -> Option<u16> {
    segment.parse::<u16>().ok().filter(|p| *p != 0)
}
