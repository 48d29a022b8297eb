//! Socket lifecycle and newline-delimited frame I/O.
//!
//! # Why a custom reader?
//!
//! TCP is a byte stream: one `read()` may return half a frame or three frames
//! at once.  [`FrameReader`] accumulates bytes until it sees a `\n` and hands
//! out exactly one frame body per call.
//!
//! The reader is cancellation-safe: the only await point is `fill_buf`, and
//! everything already pulled from the socket is kept in `pending`.  That lets
//! callers wrap [`FrameReader::next_frame`] in `tokio::time::timeout` during
//! the handshake and simply call it again after a timeout without losing a
//! partially received frame.
//!
//! # Timeouts per phase
//!
//! Reads take no timeout of their own.  The handshake wraps each read in a
//! short bound; after authentication the relay loop reads without one.
//! Writes go through [`write_frame`], which takes an optional bound so a
//! stalled peer can never hold a broadcaster forever.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

use super::address::ResolvedAddress;

/// Upper bound on one frame line, terminator excluded.
///
/// Sealed frames are base64, so this leaves room for roughly 6 KiB of
/// plaintext.
pub const MAX_FRAME_LEN: usize = 8192;

/// Errors from the connection layer.
#[derive(Debug, Error)]
pub enum NetError {
    /// The listener could not be bound.
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The remote refused or the route failed.
    #[error("{addr} is unreachable: {source}")]
    Unreachable {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The TCP connect did not complete in time.
    #[error("connecting to {addr} timed out after {after:?}")]
    ConnectTimeout { addr: String, after: Duration },

    /// A write did not complete in time.
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// A peer sent a line longer than [`MAX_FRAME_LEN`].
    #[error("frame exceeds {MAX_FRAME_LEN} bytes")]
    FrameTooLong,

    /// Any other socket error.
    #[error("connection I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Opens a TCP connection to `target`, bounded by `connect_timeout`.
///
/// # Errors
///
/// Returns [`NetError::ConnectTimeout`] or [`NetError::Unreachable`].
pub async fn dial(target: &ResolvedAddress, connect_timeout: Duration) -> Result<TcpStream, NetError> {
    let addr = target.to_string();
    let connect = TcpStream::connect((target.host.as_str(), target.port));
    match tokio::time::timeout(connect_timeout, connect).await {
        Ok(Ok(stream)) => {
            // Frames are small and latency-sensitive.
            let _ = stream.set_nodelay(true);
            Ok(stream)
        }
        Ok(Err(source)) => Err(NetError::Unreachable { addr, source }),
        Err(_) => Err(NetError::ConnectTimeout {
            addr,
            after: connect_timeout,
        }),
    }
}

/// Binds a TCP listener on `addr`.
///
/// # Errors
///
/// Returns [`NetError::BindFailed`] when the port is taken or not permitted.
pub async fn listen(addr: SocketAddr) -> Result<TcpListener, NetError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| NetError::BindFailed { addr, source })
}

/// Writes one frame body followed by `\n` as a single write.
///
/// # Errors
///
/// Returns [`NetError::WriteTimeout`] if `limit` elapses, or the underlying
/// I/O error.
pub async fn write_frame<W>(writer: &mut W, body: &[u8], limit: Option<Duration>) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut line = Vec::with_capacity(body.len() + 1);
    line.extend_from_slice(body);
    line.push(b'\n');

    let write = async {
        writer.write_all(&line).await?;
        writer.flush().await
    };

    match limit {
        Some(limit) => match tokio::time::timeout(limit, write).await {
            Ok(result) => result.map_err(NetError::from),
            Err(_) => Err(NetError::WriteTimeout(limit)),
        },
        None => write.await.map_err(NetError::from),
    }
}

/// Buffered reader yielding one frame body per call.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    pending: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            pending: Vec::new(),
        }
    }

    /// Reads the next frame body, without its terminator.
    ///
    /// Returns `Ok(None)` when the peer closed the stream cleanly.  A trailing
    /// `\r` is stripped so hand-typed test clients work.  Empty lines are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::FrameTooLong`] if a line exceeds [`MAX_FRAME_LEN`];
    /// the connection should be dropped since framing is lost.
    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, NetError> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                if !self.pending.is_empty() {
                    debug!("peer closed mid-frame; {} bytes discarded", self.pending.len());
                    self.pending.clear();
                }
                return Ok(None);
            }

            let (chunk_len, complete) = match available.iter().position(|b| *b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (available.len(), false),
            };
            self.pending.extend_from_slice(&available[..chunk_len]);
            self.inner.consume(chunk_len);

            if !complete {
                if self.pending.len() > MAX_FRAME_LEN {
                    self.pending.clear();
                    return Err(NetError::FrameTooLong);
                }
                continue;
            }

            let mut frame = std::mem::take(&mut self.pending);
            frame.pop();
            if frame.last() == Some(&b'\r') {
                frame.pop();
            }
            if frame.len() > MAX_FRAME_LEN {
                return Err(NetError::FrameTooLong);
            }
            if frame.is_empty() {
                continue;
            }
            return Ok(Some(frame));
        }
    }
}
