//! Failed-attempt tracking and the ban set.
//!
//! A source address accumulates one failure for every handshake reply that
//! did not open to a valid acknowledgement.  At [`BAN_THRESHOLD`] failures it
//! is banned until a moderator lifts the ban.  Silence is never a failure: a
//! peer that never replied gives no evidence of guessing.
//!
//! The policy is plain data with no I/O.  HQ keeps one instance behind its
//! relay lock and consults it at accept time, before any handshake byte is
//! sent.

use std::collections::HashMap;
use std::net::IpAddr;

/// Failures that trigger an automatic ban.
pub const BAN_THRESHOLD: u32 = 3;

/// Per-address moderation state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModerationRecord {
    pub failed_attempts: u32,
    pub banned: bool,
}

/// Decision for an incoming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Proceed to the handshake.
    Admit,
    /// Close immediately with zero bytes sent.
    Reject,
}

/// Failure counters and ban flags keyed by source address.
#[derive(Debug, Default)]
pub struct ModerationPolicy {
    records: HashMap<IpAddr, ModerationRecord>,
}

impl ModerationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a policy with `addresses` already banned (loaded from config).
    pub fn with_bans(addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        let mut policy = Self::new();
        for addr in addresses {
            policy.ban(addr);
        }
        policy
    }

    /// Decides whether `addr` may start a handshake.
    pub fn evaluate(&self, addr: IpAddr) -> Admission {
        if self.is_banned(addr) {
            Admission::Reject
        } else {
            Admission::Admit
        }
    }

    pub fn is_banned(&self, addr: IpAddr) -> bool {
        self.records.get(&addr).is_some_and(|r| r.banned)
    }

    /// Records one failed attempt and returns the new count.
    ///
    /// Reaching [`BAN_THRESHOLD`] bans the address.
    pub fn record_failure(&mut self, addr: IpAddr) -> u32 {
        let record = self.records.entry(addr).or_default();
        record.failed_attempts = record.failed_attempts.saturating_add(1);
        if record.failed_attempts >= BAN_THRESHOLD {
            record.banned = true;
        }
        record.failed_attempts
    }

    /// Bans `addr` regardless of its counter.
    pub fn ban(&mut self, addr: IpAddr) {
        self.records.entry(addr).or_default().banned = true;
    }

    /// Lifts a ban and clears the counter.  Returns `true` if `addr` was
    /// banned.
    pub fn unban(&mut self, addr: IpAddr) -> bool {
        match self.records.remove(&addr) {
            Some(record) => record.banned,
            None => false,
        }
    }

    /// Clears the counter after a successful authentication.
    pub fn reset_on_success(&mut self, addr: IpAddr) {
        if let Some(record) = self.records.get_mut(&addr) {
            record.failed_attempts = 0;
            if !record.banned {
                self.records.remove(&addr);
            }
        }
    }

    pub fn failed_attempts(&self, addr: IpAddr) -> u32 {
        self.records.get(&addr).map_or(0, |r| r.failed_attempts)
    }

    pub fn record(&self, addr: IpAddr) -> Option<&ModerationRecord> {
        self.records.get(&addr)
    }

    /// Banned addresses in ascending order.
    pub fn banned_addresses(&self) -> Vec<IpAddr> {
        let mut banned: Vec<IpAddr> = self
            .records
            .iter()
            .filter(|(_, r)| r.banned)
            .map(|(addr, _)| *addr)
            .collect();
        banned.sort();
        banned
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
