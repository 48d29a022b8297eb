//! CommsUseCase: the agent operator's three actions.
//!
//! The use case sits between the operator surface (the terminal loop in
//! `main.rs`, or any other front end) and the link to HQ.  It depends only on
//! two traits:
//!
//! - [`Uplink`] carries text lines to HQ and owns the connection lifecycle.
//!   The infrastructure implementation dials TCP, runs the initiator
//!   handshake, and seals every frame.
//! - [`LinkObserver`] receives log lines, connection status changes, and
//!   decoded inbound messages.
//!
//! # Operator actions (for beginners)
//!
//! - `toggle_connection` opens the link when it is down and closes it when it
//!   is up.  Each press flips the state once.
//! - `send_chat` and `send_radio` build the wire text with the operator's
//!   display name in front and hand it to the uplink.  Blank input is
//!   ignored rather than sent as an empty frame.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use shield_core::net::{AddressError, NetError};
use shield_core::protocol::{EnvelopeError, HandshakeError, Message};

/// Error type for agent-side link operations.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid HQ address: {0}")]
    Address(#[from] AddressError),
    #[error("network error: {0}")]
    Net(#[from] NetError),
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("could not seal message: {0}")]
    Envelope(#[from] EnvelopeError),
    /// HQ answered the acknowledgement with `ACCESS_DENIED`.
    #[error("access denied by HQ")]
    Denied,
    /// No beacon could be opened in time.  HQ is silent or the password is
    /// wrong; the two look identical from this side.
    #[error("HQ did not complete the handshake (silent peer or wrong password)")]
    HandshakeTimeout,
    #[error("HQ closed the connection during the handshake")]
    PeerClosed,
    #[error("not connected to HQ")]
    NotConnected,
}

/// How loudly a log line should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// The link to HQ.
///
/// Infrastructure implementations use sealed TCP; test implementations record
/// calls.
#[async_trait]
pub trait Uplink: Send + Sync {
    /// Dials HQ and completes the handshake.
    async fn open(&self) -> Result<(), AgentError>;

    /// Tears the link down.  A no-op when it is already down.
    async fn close(&self);

    /// Seals and sends one text line.
    async fn transmit(&self, line: &str) -> Result<(), AgentError>;

    /// Returns `true` while an authenticated link is established.
    fn is_up(&self) -> bool;
}

/// Receives everything the operator should see.
#[cfg_attr(test, mockall::automock)]
pub trait LinkObserver: Send + Sync {
    fn on_log(&self, text: &str, severity: Severity);
    fn on_status_changed(&self, connected: bool);
    fn on_message(&self, message: &Message);
}

/// The operator-facing use case.
pub struct CommsUseCase {
    uplink: Arc<dyn Uplink>,
    observer: Arc<dyn LinkObserver>,
    display_name: String,
}

impl CommsUseCase {
    pub fn new(
        uplink: Arc<dyn Uplink>,
        observer: Arc<dyn LinkObserver>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            uplink,
            observer,
            display_name: display_name.into(),
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn is_connected(&self) -> bool {
        self.uplink.is_up()
    }

    /// Opens the link if it is down, closes it if it is up.
    ///
    /// Returns the new connection state.
    ///
    /// # Errors
    ///
    /// Returns the [`AgentError`] that prevented the link from opening.  The
    /// error has already been reported to the observer.
    pub async fn toggle_connection(&self) -> Result<bool, AgentError> {
        if self.uplink.is_up() {
            self.uplink.close().await;
            self.observer.on_log("Disconnected.", Severity::Warning);
            return Ok(false);
        }

        self.observer.on_log("Establishing secure link...", Severity::Info);
        match self.uplink.open().await {
            Ok(()) => {
                self.observer.on_log("Secure link established", Severity::Success);
                Ok(true)
            }
            Err(e) => {
                let text = match &e {
                    AgentError::Denied => "ACCESS DENIED: invalid key".to_string(),
                    other => format!("Connection failed: {other}"),
                };
                self.observer.on_log(&text, Severity::Error);
                Err(e)
            }
        }
    }

    /// Sends a chat line.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::NotConnected`] while the link is down, or the
    /// uplink's send error.
    pub async fn send_chat(&self, text: &str) -> Result<(), AgentError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        self.send_line(&Message::chat_line(&self.display_name, text), text)
            .await
    }

    /// Sends a radio broadcast.
    ///
    /// # Errors
    ///
    /// Same as [`send_chat`](Self::send_chat).
    pub async fn send_radio(&self, text: &str) -> Result<(), AgentError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        self.send_line(&Message::radio_line(&self.display_name, text), text)
            .await
    }

    async fn send_line(&self, line: &str, echo: &str) -> Result<(), AgentError> {
        if !self.uplink.is_up() {
            self.observer.on_log("Not connected", Severity::Warning);
            return Err(AgentError::NotConnected);
        }
        match self.uplink.transmit(line).await {
            Ok(()) => {
                self.observer.on_log(&format!("You: {echo}"), Severity::Info);
                Ok(())
            }
            Err(e) => {
                self.observer.on_log("Send error", Severity::Error);
                Err(e)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
