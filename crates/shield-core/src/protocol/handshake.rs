//! Authentication handshake between HQ (acceptor) and an agent (initiator).
//!
//! # How the handshake works (for beginners)
//!
//! Both ends derive the same key from the shared password.  HQ then proves
//! nothing and asks nothing in the clear: it repeatedly sends a *sealed*
//! `AUTH_REQUEST` beacon.  Only an agent holding the right key can open the
//! beacon, so only such an agent knows it is being asked to authenticate.
//!
//! ```text
//!   HQ (acceptor)                          Agent (initiator)
//!   ─────────────                          ─────────────────
//!   seal(AUTH_REQUEST)  ──────────────▶   open ok?  no → ignore, keep reading
//!   (wait ≤ interval, resend ×N)                    yes ↓
//!   open(reply) == AUTH_ACK? ◀───────────  seal(AUTH_ACK[:name])
//!        yes → seal(ACCESS_GRANTED) ────▶  Authenticated
//!        no  → seal(ACCESS_DENIED)  ────▶  Denied
//! ```
//!
//! The beacon is resent because some tunnels swallow the first bytes of a
//! fresh stream.  Every resend is sealed with a fresh nonce, so the repeats
//! are not byte-identical.
//!
//! A consequence worth knowing: an agent with the wrong password cannot open
//! any beacon, never replies, and therefore experiences HQ as *silent*.  Its
//! outcome is [`InitiatorOutcome::TimedOut`], not `Denied`.
//!
//! # Structure
//!
//! The state transitions live in two pure machines, [`AcceptorMachine`] and
//! [`InitiatorMachine`], which never touch a socket.  The async drivers
//! [`accept_handshake`] and [`initiate_handshake`] feed them frames read from
//! a [`FrameReader`] and perform the writes they ask for.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::envelope::{Envelope, EnvelopeError};
use super::tokens::ControlToken;
use crate::net::{write_frame, FrameReader, NetError};

/// Handshake progress shared by both roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Start,
    /// Acceptor is sending beacons and waiting for a reply.
    BeaconWait,
    /// Initiator is waiting for a beacon it can open.
    AwaitAuth,
    /// A valid beacon/acknowledgement pair has been seen; the verdict is
    /// pending.
    KeyExchanged,
    Authenticated,
    Denied,
    TimedOut,
}

impl HandshakeState {
    /// Returns `true` once no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            HandshakeState::Authenticated | HandshakeState::Denied | HandshakeState::TimedOut
        )
    }
}

/// Timing knobs for both roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// Beacons the acceptor sends before giving up.
    pub beacon_attempts: u32,
    /// How long the acceptor waits for a reply after each beacon.  Also bounds
    /// every handshake write on both sides.
    pub beacon_interval: Duration,
    /// Upper bound on the initiator's whole exchange.
    pub session_ceiling: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            beacon_attempts: 15,
            beacon_interval: Duration::from_millis(1500),
            session_ceiling: Duration::from_secs(30),
        }
    }
}

/// Faults that abort a handshake without a protocol verdict.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("handshake transport failed: {0}")]
    Net(#[from] NetError),

    #[error("could not seal handshake token: {0}")]
    Envelope(#[from] EnvelopeError),
}

// ── Acceptor ──────────────────────────────────────────────────────────────────

/// Verdict of the acceptor on a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptorVerdict {
    /// The reply opened to an acknowledgement.
    Accepted { client_name: Option<String> },
    /// The reply did not open, or opened to something else.
    Rejected,
}

/// Pure acceptor state machine.
#[derive(Debug)]
pub struct AcceptorMachine {
    state: HandshakeState,
    beacons_sent: u32,
    max_beacons: u32,
}

impl AcceptorMachine {
    pub fn new(max_beacons: u32) -> Self {
        Self {
            state: HandshakeState::Start,
            beacons_sent: 0,
            max_beacons,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn beacons_sent(&self) -> u32 {
        self.beacons_sent
    }

    /// Asks whether another beacon should go out.
    ///
    /// Returns `false` and moves to `TimedOut` once the budget is spent.
    pub fn next_beacon(&mut self) -> bool {
        if self.state.is_terminal() || self.state == HandshakeState::KeyExchanged {
            return false;
        }
        if self.beacons_sent >= self.max_beacons {
            self.state = HandshakeState::TimedOut;
            return false;
        }
        self.beacons_sent += 1;
        self.state = HandshakeState::BeaconWait;
        true
    }

    /// Judges a reply.  `opened` is `None` when the frame failed to open.
    pub fn on_reply(&mut self, opened: Option<&[u8]>) -> AcceptorVerdict {
        match opened.and_then(ControlToken::parse) {
            Some(ControlToken::AuthAck { name }) => {
                self.state = HandshakeState::KeyExchanged;
                AcceptorVerdict::Accepted { client_name: name }
            }
            _ => {
                self.state = HandshakeState::Denied;
                AcceptorVerdict::Rejected
            }
        }
    }

    /// The grant token has been written.
    pub fn grant_sent(&mut self) {
        if self.state == HandshakeState::KeyExchanged {
            self.state = HandshakeState::Authenticated;
        }
    }

    /// The peer went away before replying.  Treated as silence.
    pub fn on_peer_closed(&mut self) {
        if !self.state.is_terminal() {
            self.state = HandshakeState::TimedOut;
        }
    }
}

/// Result of [`accept_handshake`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptorOutcome {
    /// The peer proved the key.  `client_name` is the name it offered, if any;
    /// it is not validated here.
    Authenticated { client_name: Option<String> },
    /// The peer replied with something wrong.  Counts as a failed attempt.
    Denied,
    /// The peer never replied.  No penalty.
    TimedOut,
}

/// Runs the acceptor side over an already accepted connection.
///
/// # Errors
///
/// Returns [`HandshakeError`] if a beacon or the grant cannot be written.
/// Such failures carry no moderation penalty.
pub async fn accept_handshake<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut W,
    envelope: &Envelope,
    config: &HandshakeConfig,
) -> Result<AcceptorOutcome, HandshakeError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut machine = AcceptorMachine::new(config.beacon_attempts);
    let beacon = ControlToken::AuthRequest.to_text();

    while machine.next_beacon() {
        let body = envelope.seal_frame(beacon.as_bytes())?;
        write_frame(writer, &body, Some(config.beacon_interval)).await?;

        let opened = match tokio::time::timeout(config.beacon_interval, reader.next_frame()).await {
            Err(_) => {
                debug!(attempt = machine.beacons_sent(), "no reply to beacon");
                continue;
            }
            Ok(Ok(None)) => {
                machine.on_peer_closed();
                debug!("peer closed during handshake");
                return Ok(AcceptorOutcome::TimedOut);
            }
            // A line too long to be a token is as wrong as a bad one.
            Ok(Err(NetError::FrameTooLong)) => None,
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(Some(frame))) => envelope.open_frame(&frame).ok(),
        };

        return match machine.on_reply(opened.as_deref()) {
            AcceptorVerdict::Accepted { client_name } => {
                let grant = envelope.seal_frame(ControlToken::AccessGranted.to_text().as_bytes())?;
                write_frame(writer, &grant, Some(config.beacon_interval)).await?;
                machine.grant_sent();
                Ok(AcceptorOutcome::Authenticated { client_name })
            }
            AcceptorVerdict::Rejected => {
                let denial = envelope.seal_frame(ControlToken::AccessDenied.to_text().as_bytes())?;
                if let Err(e) = write_frame(writer, &denial, Some(config.beacon_interval)).await {
                    debug!("could not deliver denial: {e}");
                }
                Ok(AcceptorOutcome::Denied)
            }
        };
    }

    debug!(beacons = machine.beacons_sent(), "beacon budget exhausted");
    Ok(AcceptorOutcome::TimedOut)
}

// ── Initiator ─────────────────────────────────────────────────────────────────

/// What the initiator should do with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiatorAction {
    /// Not for us, or not relevant in this state.
    Ignore,
    /// A beacon opened: send the acknowledgement.
    SendAck,
    Granted,
    Denied,
}

/// Pure initiator state machine.
#[derive(Debug)]
pub struct InitiatorMachine {
    state: HandshakeState,
}

impl InitiatorMachine {
    pub fn new() -> Self {
        Self {
            state: HandshakeState::AwaitAuth,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Feeds one frame.  `opened` is `None` when the frame failed to open.
    pub fn on_frame(&mut self, opened: Option<&[u8]>) -> InitiatorAction {
        let token = opened.and_then(ControlToken::parse);
        match (self.state, token) {
            (HandshakeState::AwaitAuth, Some(ControlToken::AuthRequest)) => {
                self.state = HandshakeState::KeyExchanged;
                InitiatorAction::SendAck
            }
            (HandshakeState::KeyExchanged, Some(ControlToken::AccessGranted)) => {
                self.state = HandshakeState::Authenticated;
                InitiatorAction::Granted
            }
            (HandshakeState::KeyExchanged, Some(ControlToken::AccessDenied)) => {
                self.state = HandshakeState::Denied;
                InitiatorAction::Denied
            }
            _ => InitiatorAction::Ignore,
        }
    }

    pub fn on_timeout(&mut self) {
        if !self.state.is_terminal() {
            self.state = HandshakeState::TimedOut;
        }
    }
}

impl Default for InitiatorMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of [`initiate_handshake`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiatorOutcome {
    Authenticated,
    /// HQ explicitly rejected the acknowledgement.
    Denied,
    /// No beacon could be opened within the ceiling: HQ is silent, or the
    /// password is wrong.  The two are indistinguishable here.
    TimedOut,
    /// HQ hung up after the acknowledgement was sent.
    PeerClosed,
}

/// Runs the initiator side over a freshly dialed connection.
///
/// `display_name` is offered to HQ inside the acknowledgement.
///
/// # Errors
///
/// Returns [`HandshakeError`] on transport faults other than a clean close.
pub async fn initiate_handshake<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut W,
    envelope: &Envelope,
    config: &HandshakeConfig,
    display_name: Option<&str>,
) -> Result<InitiatorOutcome, HandshakeError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut machine = InitiatorMachine::new();
    let ack = ControlToken::AuthAck {
        name: display_name.map(str::to_string),
    };

    // The ack gets the same short bound as HQ's beacons; only the whole
    // exchange is held to the ceiling.
    let exchange = drive_initiator(&mut machine, reader, writer, envelope, &ack, config.beacon_interval);
    match tokio::time::timeout(config.session_ceiling, exchange).await {
        Ok(outcome) => outcome,
        Err(_) => {
            machine.on_timeout();
            Ok(InitiatorOutcome::TimedOut)
        }
    }
}

async fn drive_initiator<R, W>(
    machine: &mut InitiatorMachine,
    reader: &mut FrameReader<R>,
    writer: &mut W,
    envelope: &Envelope,
    ack: &ControlToken,
    write_limit: Duration,
) -> Result<InitiatorOutcome, HandshakeError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    loop {
        let Some(frame) = reader.next_frame().await? else {
            return Ok(match machine.state() {
                HandshakeState::KeyExchanged => InitiatorOutcome::PeerClosed,
                _ => InitiatorOutcome::TimedOut,
            });
        };
        let opened = envelope.open_frame(&frame).ok();
        match machine.on_frame(opened.as_deref()) {
            InitiatorAction::Ignore => debug!("ignoring frame during handshake"),
            InitiatorAction::SendAck => {
                let body = envelope.seal_frame(ack.to_text().as_bytes())?;
                write_frame(writer, &body, Some(write_limit)).await?;
            }
            InitiatorAction::Granted => return Ok(InitiatorOutcome::Authenticated),
            InitiatorAction::Denied => return Ok(InitiatorOutcome::Denied),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
