//! SessionRegistry: the live set of authenticated connections.
//!
//! A session enters the registry only after its handshake reached
//! `Authenticated`, and leaves it when the connection closes, a relay write
//! to it fails, or a moderator kicks or bans it.
//!
//! # Session lifecycle (for beginners)
//!
//! ```text
//! accept ──► handshake ──► admit ──► relay loop ──► remove
//!                                         ▲             │
//!                              kick / ban ┘   write fail┘
//! ```
//!
//! The registry is keyed by a per-connection [`SessionId`], not by address, so
//! one address may hold several sessions at once.  Display names are labels
//! only and may collide.
//!
//! Each [`SessionHandle`] owns the write half of its socket behind its own
//! mutex.  Broadcasters clone the `Arc<SessionHandle>` out of the registry and
//! write without holding the registry lock.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use shield_core::net::{write_frame, NetError};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

/// Identifier of one admitted connection.
pub type SessionId = Uuid;

/// Write half of a session's connection.
pub type FrameSink = Box<dyn AsyncWrite + Send + Unpin>;

/// One admitted connection.
pub struct SessionHandle {
    pub id: SessionId,
    pub address: SocketAddr,
    pub display_name: String,
    pub admitted_at: SystemTime,
    sink: Mutex<FrameSink>,
    kick: Notify,
}

impl SessionHandle {
    pub fn new(address: SocketAddr, display_name: String, sink: FrameSink) -> Self {
        Self {
            id: Uuid::new_v4(),
            address,
            display_name,
            admitted_at: SystemTime::now(),
            sink: Mutex::new(sink),
            kick: Notify::new(),
        }
    }

    /// Writes one frame to this session.
    ///
    /// `limit` bounds the wait for the sink lock plus the write itself, so a
    /// stalled peer cannot hold a broadcaster longer than that.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::WriteTimeout`] or the underlying I/O error.
    pub async fn send_frame(&self, body: &[u8], limit: Duration) -> Result<(), NetError> {
        let write = async {
            let mut sink = self.sink.lock().await;
            write_frame(&mut *sink, body, None).await
        };
        match tokio::time::timeout(limit, write).await {
            Ok(result) => result,
            Err(_) => Err(NetError::WriteTimeout(limit)),
        }
    }

    /// Shuts down the write half so the peer sees end-of-stream.
    pub async fn close(&self, limit: Duration) {
        let shutdown = async {
            let mut sink = self.sink.lock().await;
            sink.shutdown().await
        };
        let _ = tokio::time::timeout(limit, shutdown).await;
    }

    /// Asks the session's read loop to stop.
    pub fn kick(&self) {
        // `notify_one` keeps a permit if the loop is not waiting right now.
        self.kick.notify_one();
    }

    /// Resolves once [`kick`](Self::kick) has been called.
    pub async fn kicked(&self) {
        self.kick.notified().await;
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            address: self.address,
            display_name: self.display_name.clone(),
            admitted_at: self.admitted_at,
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a session for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub address: SocketAddr,
    pub display_name: String,
    pub admitted_at: SystemTime,
}

/// In-memory registry of admitted sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Arc<SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an admitted session.
    pub fn admit(&mut self, session: Arc<SessionHandle>) {
        self.sessions.insert(session.id, session);
    }

    /// Removes a session, returning it if it was present.
    pub fn remove(&mut self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.remove(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Every session carrying `name`.  Names are not unique.
    pub fn find_by_name(&self, name: &str) -> Vec<Arc<SessionHandle>> {
        self.sessions
            .values()
            .filter(|s| s.display_name == name)
            .cloned()
            .collect()
    }

    /// Every session whose peer is at `ip`.
    pub fn by_address(&self, ip: IpAddr) -> Vec<Arc<SessionHandle>> {
        self.sessions
            .values()
            .filter(|s| s.address.ip() == ip)
            .cloned()
            .collect()
    }

    /// Snapshot of all sessions.
    pub fn all(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.values().cloned().collect()
    }

    /// Snapshot of all sessions except `except`.
    pub fn others(&self, except: SessionId) -> Vec<Arc<SessionHandle>> {
        self.sessions
            .values()
            .filter(|s| s.id != except)
            .cloned()
            .collect()
    }

    /// Summaries sorted by admission time.
    pub fn summaries(&self) -> Vec<SessionSummary> {
        let mut list: Vec<SessionSummary> = self.sessions.values().map(|s| s.summary()).collect();
        list.sort_by_key(|s| s.admitted_at);
        list
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use shield_core::net::FrameReader;

    fn make_session(addr: &str, name: &str) -> Arc<SessionHandle> {
        Arc::new(SessionHandle::new(
            addr.parse().unwrap(),
            name.to_string(),
            Box::new(tokio::io::sink()),
        ))
    }

    #[test]
    fn test_registry_starts_empty() {
        let registry = SessionRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.all().is_empty());
    }

    #[test]
    fn test_admit_then_contains() {
        let mut registry = SessionRegistry::new();
        let session = make_session("10.0.0.1:5000", "AGENT_1");
        let id = session.id;

        registry.admit(session);

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(id));
        assert_eq!(registry.summaries()[0].display_name, "AGENT_1");
    }

    #[test]
    fn test_remove_returns_session_once() {
        let mut registry = SessionRegistry::new();
        let session = make_session("10.0.0.1:5000", "AGENT_1");
        let id = session.id;
        registry.admit(session);

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(!registry.contains(id));
    }

    #[test]
    fn test_same_address_may_hold_several_sessions() {
        let mut registry = SessionRegistry::new();
        registry.admit(make_session("10.0.0.7:5000", "AGENT_7"));
        registry.admit(make_session("10.0.0.7:5001", "AGENT_7"));

        let ip: IpAddr = "10.0.0.7".parse().unwrap();
        assert_eq!(registry.by_address(ip).len(), 2);
        assert_eq!(registry.find_by_name("AGENT_7").len(), 2);
    }

    #[test]
    fn test_others_excludes_sender() {
        let mut registry = SessionRegistry::new();
        let a = make_session("10.0.0.1:5000", "A");
        let a_id = a.id;
        registry.admit(a);
        registry.admit(make_session("10.0.0.2:5000", "B"));
        registry.admit(make_session("10.0.0.3:5000", "C"));

        let others = registry.others(a_id);

        assert_eq!(others.len(), 2);
        assert!(others.iter().all(|s| s.id != a_id));
    }

    #[tokio::test]
    async fn test_send_frame_writes_terminated_line() {
        let (tx, rx) = tokio::io::duplex(256);
        let session = SessionHandle::new("10.0.0.1:5000".parse().unwrap(), "A".into(), Box::new(tx));

        session.send_frame(b"hello", Duration::from_secs(1)).await.unwrap();
        session.close(Duration::from_secs(1)).await;

        let mut reader = FrameReader::new(rx);
        assert_eq!(reader.next_frame().await.unwrap(), Some(b"hello".to_vec()));
        assert_eq!(reader.next_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_send_frame_surfaces_broken_pipe() {
        let mock = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer gone"))
            .build();
        let session = SessionHandle::new("10.0.0.1:5000".parse().unwrap(), "A".into(), Box::new(mock));

        let result = session.send_frame(b"hello", Duration::from_secs(1)).await;

        assert!(matches!(result, Err(NetError::Io(e)) if e.kind() == std::io::ErrorKind::BrokenPipe));
    }

    #[tokio::test]
    async fn test_send_frame_is_one_write() {
        let mock = tokio_test::io::Builder::new().write(b"sealed-body\n").build();
        let session = SessionHandle::new("10.0.0.1:5000".parse().unwrap(), "A".into(), Box::new(mock));

        session.send_frame(b"sealed-body", Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_kick_before_wait_is_not_lost() {
        let session = make_session("10.0.0.1:5000", "A");
        session.kick();
        tokio::time::timeout(Duration::from_secs(1), session.kicked())
            .await
            .expect("stored permit must wake the waiter");
    }
}
