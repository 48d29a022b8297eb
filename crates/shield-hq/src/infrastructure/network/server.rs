//! TCP server: accept loop and per-connection tasks.
//!
//! This module is responsible for:
//!
//! 1. Accepting connections on an already bound listener.
//! 2. Rejecting banned addresses before a single byte is written.
//! 3. Running the acceptor handshake on every other connection.
//! 4. Admitting authenticated peers to the [`Relay`] and running their read
//!    loop until they leave or are kicked.
//! 5. Stopping the accept loop when the `running` flag is cleared.
//!
//! # Failure isolation
//!
//! Each connection lives in its own Tokio task.  Nothing that goes wrong on
//! one connection (a bad reply, a frame that fails to open, a broken pipe)
//! reaches any other connection or the accept loop.
//!
//! # Shutdown
//!
//! The accept loop polls `running` between 200 ms accept timeouts rather
//! than waiting on a notify, so clearing the flag stops new accepts within
//! one poll and drops the listener.  Admitted sessions are not force-closed;
//! they end on their next failed read or write.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use shield_core::domain::Admission;
use shield_core::net::FrameReader;
use shield_core::protocol::{accept_handshake, AcceptorOutcome, HandshakeConfig, Message};

use crate::application::relay::Relay;
use crate::application::session_registry::SessionHandle;

/// How often the accept loop re-checks the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Runs the accept loop until `running` is set to `false`.
///
/// # Errors
///
/// Currently infallible once the listener is bound; accept errors are logged
/// and the loop continues.
pub async fn run_server(
    listener: TcpListener,
    relay: Arc<Relay>,
    handshake: HandshakeConfig,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("HQ listening on {addr}");
    }
    let handshake = Arc::new(handshake);

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                let relay = Arc::clone(&relay);
                let handshake = Arc::clone(&handshake);
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, relay, handshake).await;
                });
            }
            Ok(Err(e)) => {
                // Transient (e.g. out of file descriptors); keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Full lifecycle of one accepted connection.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    relay: Arc<Relay>,
    handshake: Arc<HandshakeConfig>,
) {
    let ip = peer_addr.ip();
    if relay.evaluate(ip).await == Admission::Reject {
        info!("refused banned address {peer_addr}");
        return;
    }

    debug!("connection from {peer_addr}; starting handshake");
    let _ = stream.set_nodelay(true);
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);

    match accept_handshake(&mut reader, &mut write_half, relay.envelope(), &handshake).await {
        Ok(AcceptorOutcome::Authenticated { client_name }) => {
            // A moderator may have banned the address mid-handshake.
            if let Some(session) = relay.admit(peer_addr, client_name, Box::new(write_half)).await {
                relay_loop(reader, session, &relay).await;
            }
        }
        Ok(AcceptorOutcome::Denied) => {
            // Counted before the socket drops, so the peer's EOF implies the
            // failure is already on record.
            relay.record_failure(ip).await;
        }
        Ok(AcceptorOutcome::TimedOut) => {
            info!("{peer_addr} never answered the beacon; closing");
        }
        Err(e) => {
            warn!("handshake with {peer_addr} aborted: {e}");
        }
    }
}

/// Reads frames from one session and relays them until the peer leaves or is
/// kicked.
async fn relay_loop<R: AsyncRead + Unpin>(mut reader: FrameReader<R>, session: Arc<SessionHandle>, relay: &Relay) {
    let reason = loop {
        tokio::select! {
            _ = session.kicked() => break "kicked",
            frame = reader.next_frame() => match frame {
                Ok(Some(body)) => {
                    log_frame(relay, &session, &body);
                    relay.relay(session.id, &body).await;
                }
                Ok(None) => break "disconnected",
                Err(e) => {
                    warn!("read from {} failed: {e}", session.display_name);
                    break "connection error";
                }
            },
        }
    };
    relay.remove(session.id, reason).await;
}

/// Opens a frame for the local log only.  The relayed bytes are never the
/// opened ones.
fn log_frame(relay: &Relay, session: &SessionHandle, body: &[u8]) {
    match relay.envelope().open_text(body) {
        Ok(text) => match Message::classify(&text) {
            Message::Radio(content) => debug!(from = %session.display_name, "radio: {content}"),
            other => debug!(from = %session.display_name, "{other}"),
        },
        Err(e) if e.is_bad_cipher() => {
            debug!(from = %session.display_name, "frame did not open locally; relaying anyway")
        }
        Err(e) => debug!(from = %session.display_name, "frame not inspected: {e}"),
    }
}
