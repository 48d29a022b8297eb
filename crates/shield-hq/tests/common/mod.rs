//! Shared harness for the HQ integration tests.
//!
//! Starts a real HQ accept loop on an ephemeral loopback port and builds
//! agents that talk to it through the agent crate's TCP uplink.  Handshake
//! timings are shortened so the failure paths finish in well under a second.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use shield_agent::application::comms::{LinkObserver, Severity, Uplink};
use shield_agent::infrastructure::network::{AgentConnection, LinkSettings};
use shield_core::domain::ModerationPolicy;
use shield_core::net::{listen, FrameReader, ResolvedAddress};
use shield_core::protocol::{initiate_handshake, Envelope, HandshakeConfig, InitiatorOutcome, Message};

use shield_hq::application::relay::{Relay, RelaySettings};
use shield_hq::infrastructure::network::run_server;

pub const PASSWORD: &str = "ALPHA-77";
pub const WAIT: Duration = Duration::from_secs(3);

pub fn fast_handshake() -> HandshakeConfig {
    HandshakeConfig {
        beacon_attempts: 5,
        beacon_interval: Duration::from_millis(100),
        session_ceiling: Duration::from_secs(3),
    }
}

/// A running HQ.
pub struct TestHq {
    pub relay: Arc<Relay>,
    pub addr: SocketAddr,
    running: Arc<AtomicBool>,
}

impl Drop for TestHq {
    fn drop(&mut self) {
        self.running.store(false, std::sync::atomic::Ordering::Relaxed);
    }
}

pub async fn start_hq() -> TestHq {
    let relay = Arc::new(Relay::new(
        Envelope::sealed(PASSWORD).unwrap(),
        RelaySettings {
            write_timeout: Duration::from_millis(500),
            adopt_client_names: true,
        },
        ModerationPolicy::new(),
    ));
    let listener = listen("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let running = Arc::new(AtomicBool::new(true));

    tokio::spawn(run_server(listener, Arc::clone(&relay), fast_handshake(), Arc::clone(&running)));

    TestHq { relay, addr, running }
}

/// Forwards everything an agent would show its operator to a channel.
pub struct ChannelObserver(mpsc::UnboundedSender<Message>);

impl LinkObserver for ChannelObserver {
    fn on_log(&self, _text: &str, _severity: Severity) {}
    fn on_status_changed(&self, _connected: bool) {}
    fn on_message(&self, message: &Message) {
        let _ = self.0.send(message.clone());
    }
}

/// An agent plus the stream of messages it received.
pub struct TestAgent {
    pub link: AgentConnection,
    pub inbox: mpsc::UnboundedReceiver<Message>,
}

impl TestAgent {
    /// Waits for the next non-`SYSTEM` message.
    pub async fn next_traffic(&mut self) -> Option<Message> {
        loop {
            match tokio::time::timeout(WAIT, self.inbox.recv()).await {
                Ok(Some(Message::System(_))) => continue,
                Ok(other) => return other,
                Err(_) => return None,
            }
        }
    }

    /// Drains what has arrived so far and returns the non-`SYSTEM` messages.
    pub fn drain_traffic(&mut self) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(message) = self.inbox.try_recv() {
            if !matches!(message, Message::System(_)) {
                out.push(message);
            }
        }
        out
    }
}

pub fn agent(hq: &TestHq, password: &str, name: &str) -> TestAgent {
    let (tx, inbox) = mpsc::unbounded_channel();
    let link = AgentConnection::new(
        LinkSettings {
            target: ResolvedAddress {
                host: hq.addr.ip().to_string(),
                port: hq.addr.port(),
            },
            connect_timeout: Duration::from_secs(2),
            handshake: fast_handshake(),
            display_name: Some(name.to_string()),
            write_timeout: Duration::from_secs(2),
        },
        Envelope::sealed(password).unwrap(),
        Arc::new(ChannelObserver(tx)),
    );
    TestAgent { link, inbox }
}

/// Opens `agent` and waits until HQ has registered `expected` sessions.
///
/// The agent sees `ACCESS_GRANTED` slightly before HQ registers it, so tests
/// that count sessions must wait for the registry.
pub async fn connect(hq: &TestHq, agent: &TestAgent, expected: usize) {
    agent.link.open().await.expect("agent must authenticate");
    wait_for_sessions(hq, expected).await;
}

pub async fn wait_for_sessions(hq: &TestHq, expected: usize) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while hq.relay.session_count().await != expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "expected {expected} sessions, have {}",
            hq.relay.session_count().await
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Authenticates over a bare socket and hands back both halves, for tests
/// that need to put arbitrary bytes on the wire.
pub async fn raw_session(hq: &TestHq, name: &str) -> (FrameReader<OwnedReadHalf>, OwnedWriteHalf) {
    let envelope = Envelope::sealed(PASSWORD).unwrap();
    let (r, mut w) = TcpStream::connect(hq.addr).await.unwrap().into_split();
    let mut reader = FrameReader::new(r);
    let outcome = initiate_handshake(&mut reader, &mut w, &envelope, &fast_handshake(), Some(name))
        .await
        .unwrap();
    assert_eq!(outcome, InitiatorOutcome::Authenticated);
    (reader, w)
}
