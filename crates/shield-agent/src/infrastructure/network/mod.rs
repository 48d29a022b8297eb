//! Network infrastructure for the agent.
//!
//! [`AgentConnection`] is the TCP implementation of [`Uplink`]:
//!
//! - `open` dials HQ, runs the initiator handshake on the fresh stream, and
//!   on success keeps the write half and spawns a read task.
//! - The read task opens every inbound frame, decodes it once into a
//!   [`Message`], and hands it to the [`LinkObserver`].  Frames that do not
//!   open under the session key are dropped at `debug` level.
//! - `transmit` seals one line and writes it as a single frame.
//! - `close` stops the read task and shuts the write half down.
//!
//! Unlike HQ, the agent does not reconnect on its own.  A lost link is
//! reported through `on_status_changed(false)` and the operator decides
//! whether to toggle it back on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use shield_core::net::{dial, write_frame, FrameReader, ResolvedAddress};
use shield_core::protocol::{
    initiate_handshake, Envelope, HandshakeConfig, InitiatorOutcome, Message,
};

use crate::application::comms::{AgentError, LinkObserver, Severity, Uplink};

/// Everything needed to reach HQ.
#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub target: ResolvedAddress,
    pub connect_timeout: Duration,
    pub handshake: HandshakeConfig,
    /// Offered to HQ in the acknowledgement.
    pub display_name: Option<String>,
    /// Bound on one outbound write.
    pub write_timeout: Duration,
}

/// Sealed TCP link from an agent to HQ.
pub struct AgentConnection {
    settings: LinkSettings,
    envelope: Arc<Envelope>,
    observer: Arc<dyn LinkObserver>,
    write_half: Arc<Mutex<Option<OwnedWriteHalf>>>,
    up: Arc<AtomicBool>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl AgentConnection {
    /// Creates a new (not yet connected) link.
    pub fn new(settings: LinkSettings, envelope: Envelope, observer: Arc<dyn LinkObserver>) -> Self {
        Self {
            settings,
            envelope: Arc::new(envelope),
            observer,
            write_half: Arc::new(Mutex::new(None)),
            up: Arc::new(AtomicBool::new(false)),
            reader_task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Uplink for AgentConnection {
    async fn open(&self) -> Result<(), AgentError> {
        if self.is_up() {
            return Ok(());
        }

        let target = &self.settings.target;
        let stream = dial(target, self.settings.connect_timeout).await?;
        debug!("connected to {target}; waiting for beacon");

        let (read_half, mut write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half);
        let outcome = initiate_handshake(
            &mut reader,
            &mut write_half,
            &self.envelope,
            &self.settings.handshake,
            self.settings.display_name.as_deref(),
        )
        .await?;

        match outcome {
            InitiatorOutcome::Authenticated => info!("authenticated with HQ at {target}"),
            InitiatorOutcome::Denied => return Err(AgentError::Denied),
            InitiatorOutcome::TimedOut => return Err(AgentError::HandshakeTimeout),
            InitiatorOutcome::PeerClosed => return Err(AgentError::PeerClosed),
        }

        *self.write_half.lock().await = Some(write_half);
        self.up.store(true, Ordering::SeqCst);
        self.observer.on_status_changed(true);

        let task = tokio::spawn(read_loop(
            reader,
            Arc::clone(&self.envelope),
            Arc::clone(&self.observer),
            Arc::clone(&self.up),
            Arc::clone(&self.write_half),
        ));
        if let Some(stale) = self.reader_task.lock().await.replace(task) {
            stale.abort();
        }
        Ok(())
    }

    async fn close(&self) {
        if let Some(task) = self.reader_task.lock().await.take() {
            task.abort();
        }
        if let Some(mut writer) = self.write_half.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        if self.up.swap(false, Ordering::SeqCst) {
            info!("link to {} closed", self.settings.target);
            self.observer.on_status_changed(false);
        }
    }

    async fn transmit(&self, line: &str) -> Result<(), AgentError> {
        let body = self.envelope.seal_frame(line.as_bytes())?;

        let mut guard = self.write_half.lock().await;
        let writer = guard.as_mut().ok_or(AgentError::NotConnected)?;
        write_frame(writer, &body, Some(self.settings.write_timeout)).await?;
        Ok(())
    }

    fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }
}

/// Reads frames from HQ until the link drops.
async fn read_loop(
    mut reader: FrameReader<OwnedReadHalf>,
    envelope: Arc<Envelope>,
    observer: Arc<dyn LinkObserver>,
    up: Arc<AtomicBool>,
    write_half: Arc<Mutex<Option<OwnedWriteHalf>>>,
) {
    loop {
        match reader.next_frame().await {
            Ok(Some(body)) => match envelope.open_text(&body) {
                Ok(text) => observer.on_message(&Message::classify(&text)),
                Err(e) => debug!("dropping frame that did not open: {e}"),
            },
            Ok(None) => {
                info!("HQ closed the link");
                break;
            }
            Err(e) => {
                warn!("link read failed: {e}");
                break;
            }
        }
    }

    write_half.lock().await.take();
    if up.swap(false, Ordering::SeqCst) {
        observer.on_log("Disconnected.", Severity::Warning);
        observer.on_status_changed(false);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
