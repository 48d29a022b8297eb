//! Relay: session admission, broadcast fan-out, and moderation actions.
//!
//! The relay owns the [`SessionRegistry`] and the [`ModerationPolicy`] behind
//! one async mutex.  The lock guards bookkeeping only: every network write
//! happens on a snapshot of session handles taken out of the lock.
//!
//! # Fan-out discipline
//!
//! A frame from one session is written verbatim to every other session.  HQ
//! never re-seals relayed frames: everyone shares one key, so the sender's
//! seal is valid for all recipients.
//!
//! Writes to all recipients run concurrently, each bounded by the write
//! timeout.  A recipient whose write fails or times out is removed, and a
//! sealed `SYSTEM:` notice of its departure is queued for the rest.  Delivering
//! that notice can itself fail for another recipient, so notices go through a
//! work queue instead of recursion.  The sender never learns about recipient
//! failures.

use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use shield_core::domain::{default_identity, sanitize_client_name, Admission, IdentityCounter, ModerationPolicy};
use shield_core::protocol::{Envelope, Message};

use super::session_registry::{FrameSink, SessionHandle, SessionId, SessionRegistry, SessionSummary};

/// Tunables for the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    /// Bound on one write to one recipient.
    pub write_timeout: Duration,
    /// Whether a name offered in `AUTH_ACK:<name>` replaces `AGENT_<n>`.
    pub adopt_client_names: bool,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(5),
            adopt_client_names: true,
        }
    }
}

struct RelayState {
    sessions: SessionRegistry,
    moderation: ModerationPolicy,
}

/// A frame waiting to be delivered.
struct Outbound {
    body: Vec<u8>,
    except: Option<SessionId>,
}

/// The HQ relay.  Share it as `Arc<Relay>`.
pub struct Relay {
    state: Mutex<RelayState>,
    envelope: Envelope,
    identities: IdentityCounter,
    settings: RelaySettings,
}

impl Relay {
    pub fn new(envelope: Envelope, settings: RelaySettings, moderation: ModerationPolicy) -> Self {
        Self {
            state: Mutex::new(RelayState {
                sessions: SessionRegistry::new(),
                moderation,
            }),
            envelope,
            identities: IdentityCounter::new(),
            settings,
        }
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    // ── Moderation ────────────────────────────────────────────────────────────

    /// Decides whether a fresh connection from `ip` may start a handshake.
    pub async fn evaluate(&self, ip: IpAddr) -> Admission {
        self.state.lock().await.moderation.evaluate(ip)
    }

    pub async fn is_banned(&self, ip: IpAddr) -> bool {
        self.state.lock().await.moderation.is_banned(ip)
    }

    pub async fn failed_attempts(&self, ip: IpAddr) -> u32 {
        self.state.lock().await.moderation.failed_attempts(ip)
    }

    /// Records a wrong handshake reply from `ip` and returns the new count.
    pub async fn record_failure(&self, ip: IpAddr) -> u32 {
        let (count, banned) = {
            let mut state = self.state.lock().await;
            let count = state.moderation.record_failure(ip);
            (count, state.moderation.is_banned(ip))
        };
        if banned {
            warn!("{ip} banned after {count} failed handshakes");
        } else {
            info!("failed handshake from {ip} ({count} so far)");
        }
        count
    }

    /// Bans `ip` and removes every session from it.  Returns how many sessions
    /// were removed.
    pub async fn ban(&self, ip: IpAddr) -> usize {
        let evicted = {
            let mut state = self.state.lock().await;
            state.moderation.ban(ip);
            let sessions = state.sessions.by_address(ip);
            for s in &sessions {
                state.sessions.remove(s.id);
            }
            sessions
        };
        info!("{ip} banned by moderator ({} session(s) removed)", evicted.len());
        self.evict(evicted, "banned").await
    }

    /// Lifts a ban and clears the failure counter.
    pub async fn unban(&self, ip: IpAddr) -> bool {
        let lifted = self.state.lock().await.moderation.unban(ip);
        if lifted {
            info!("{ip} unbanned");
        }
        lifted
    }

    pub async fn banned(&self) -> Vec<IpAddr> {
        self.state.lock().await.moderation.banned_addresses()
    }

    // ── Sessions ──────────────────────────────────────────────────────────────

    /// Registers a freshly authenticated connection and announces it.
    ///
    /// Clears the failure counter for the peer's address.  Returns `None`
    /// and closes the sink when the address was banned while its handshake
    /// was still running.
    pub async fn admit(
        &self,
        address: SocketAddr,
        client_name: Option<String>,
        sink: FrameSink,
    ) -> Option<Arc<SessionHandle>> {
        let adopted = client_name
            .as_deref()
            .filter(|_| self.settings.adopt_client_names)
            .and_then(sanitize_client_name);
        let display_name = adopted.unwrap_or_else(|| default_identity(address.ip(), &self.identities));

        let session = Arc::new(SessionHandle::new(address, display_name, sink));
        let online = {
            let mut state = self.state.lock().await;
            if state.moderation.is_banned(address.ip()) {
                None
            } else {
                state.moderation.reset_on_success(address.ip());
                state.sessions.admit(Arc::clone(&session));
                Some(state.sessions.len())
            }
        };
        let Some(online) = online else {
            info!("refused {address}: banned during handshake");
            session.close(self.settings.write_timeout).await;
            return None;
        };
        info!("{} admitted from {address} ({online} online)", session.display_name);

        if let Some(body) = self.system_frame(&format!("{} joined", session.display_name)) {
            self.deliver(Outbound {
                body,
                except: Some(session.id),
            })
            .await;
        }
        Some(session)
    }

    /// Removes a session and announces its departure.  Returns `false` if it
    /// was already gone.
    pub async fn remove(&self, id: SessionId, reason: &str) -> bool {
        let removed = self.state.lock().await.sessions.remove(id);
        match removed {
            Some(session) => {
                self.evict(vec![session], reason).await;
                true
            }
            None => false,
        }
    }

    /// Removes every session named `name`.  Returns how many were removed.
    pub async fn kick(&self, name: &str) -> usize {
        let evicted = {
            let mut state = self.state.lock().await;
            let sessions = state.sessions.find_by_name(name);
            for s in &sessions {
                state.sessions.remove(s.id);
            }
            sessions
        };
        if !evicted.is_empty() {
            info!("kicked {} session(s) named {name}", evicted.len());
        }
        self.evict(evicted, "kicked").await
    }

    pub async fn sessions(&self) -> Vec<SessionSummary> {
        self.state.lock().await.sessions.summaries()
    }

    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    // ── Broadcast ─────────────────────────────────────────────────────────────

    /// Forwards `body` verbatim to every session except `from`.
    ///
    /// Frames from a session that is no longer registered are dropped.
    pub async fn relay(&self, from: SessionId, body: &[u8]) {
        if !self.state.lock().await.sessions.contains(from) {
            debug!("dropping frame from removed session {from}");
            return;
        }
        self.deliver(Outbound {
            body: body.to_vec(),
            except: Some(from),
        })
        .await;
    }

    /// Seals `text` as a `SYSTEM:` notice and sends it to every session.
    pub async fn broadcast_system(&self, text: &str) {
        if let Some(body) = self.system_frame(text) {
            self.deliver(Outbound { body, except: None }).await;
        }
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn system_frame(&self, text: &str) -> Option<Vec<u8>> {
        match self.envelope.seal_frame(Message::system_line(text).as_bytes()) {
            Ok(body) => Some(body),
            Err(e) => {
                warn!("could not seal system notice: {e}");
                None
            }
        }
    }

    /// Stops and closes sessions already taken out of the registry, then
    /// announces each departure.
    async fn evict(&self, sessions: Vec<Arc<SessionHandle>>, reason: &str) -> usize {
        let count = sessions.len();
        for session in sessions {
            session.kick();
            session.close(self.settings.write_timeout).await;
            info!("{} ({}) left: {reason}", session.display_name, session.address);
            if let Some(body) = self.system_frame(&format!("{} left ({reason})", session.display_name)) {
                self.deliver(Outbound { body, except: None }).await;
            }
        }
        count
    }

    async fn deliver(&self, first: Outbound) {
        let mut queue = VecDeque::from([first]);

        while let Some(out) = queue.pop_front() {
            let recipients = {
                let state = self.state.lock().await;
                match out.except {
                    Some(id) => state.sessions.others(id),
                    None => state.sessions.all(),
                }
            };
            if recipients.is_empty() {
                continue;
            }

            let limit = self.settings.write_timeout;
            let results = join_all(recipients.iter().map(|s| s.send_frame(&out.body, limit))).await;

            for (session, result) in recipients.iter().zip(results) {
                let Err(e) = result else { continue };
                let removed = self.state.lock().await.sessions.remove(session.id);
                if removed.is_none() {
                    continue;
                }
                warn!("dropping {} ({}): {e}", session.display_name, session.address);
                session.kick();
                if let Some(body) = self.system_frame(&format!("{} left (connection lost)", session.display_name)) {
                    queue.push_back(Outbound { body, except: None });
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
