//! Integration tests for moderation through a running HQ.
//!
//! # The auto-ban flow
//!
//! ```text
//! attempt 1..3:  connect -> beacon -> garbage reply -> ACCESS_DENIED -> close
//!                failure counter 1, 2, 3 (banned at 3)
//! attempt 4:     connect -> closed with zero bytes written
//! ```
//!
//! HQ records the failure before it drops the socket, so reading a rejected
//! connection to EOF is enough to know the counter has moved.

mod common;

use std::net::IpAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use shield_agent::application::comms::Uplink;

use common::{agent, connect, start_hq, TestHq, PASSWORD, WAIT};

fn localhost() -> IpAddr {
    "127.0.0.1".parse().unwrap()
}

/// Connects, answers the first beacon with garbage, and reads to EOF.
/// Returns every byte HQ sent.
///
/// Nothing is written until a beacon has arrived, so a banned address (which
/// is closed straight away) sees a clean EOF rather than a reset.
async fn failed_attempt(hq: &TestHq) -> Vec<u8> {
    let mut stream = TcpStream::connect(hq.addr).await.unwrap();
    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    while !received.contains(&b'\n') {
        let n = tokio::time::timeout(WAIT, stream.read(&mut buf))
            .await
            .expect("HQ must either beacon or close")
            .unwrap_or(0);
        if n == 0 {
            return received;
        }
        received.extend_from_slice(&buf[..n]);
    }

    stream.write_all(b"garbage\n").await.unwrap();
    // A reset after the denial still means HQ is done with us.
    let _ = tokio::time::timeout(WAIT, stream.read_to_end(&mut received))
        .await
        .expect("HQ must close a rejected connection");
    received
}

#[tokio::test]
async fn test_three_failures_ban_the_address() {
    // Arrange
    let hq = start_hq().await;

    // Act
    for expected in 1..=3 {
        let received = failed_attempt(&hq).await;
        // Beacon plus the denial, both sealed.
        assert!(!received.is_empty());
        assert_eq!(hq.relay.failed_attempts(localhost()).await, expected);
    }

    // Assert: the fourth connection is closed before any handshake I/O.
    assert!(hq.relay.is_banned(localhost()).await);
    let received = failed_attempt(&hq).await;
    assert!(received.is_empty(), "banned address must get zero bytes");
}

#[tokio::test]
async fn test_banned_address_cannot_authenticate_even_with_password() {
    let hq = start_hq().await;
    hq.relay.ban(localhost()).await;
    let ghost = agent(&hq, PASSWORD, "GHOST");

    let result = ghost.link.open().await;

    assert!(result.is_err());
    assert_eq!(hq.relay.session_count().await, 0);
}

#[tokio::test]
async fn test_unban_then_success_resets_counter() {
    // Arrange
    let hq = start_hq().await;
    for _ in 0..3 {
        failed_attempt(&hq).await;
    }
    assert!(hq.relay.is_banned(localhost()).await);

    // Act
    assert!(hq.relay.unban(localhost()).await);
    let ghost = agent(&hq, PASSWORD, "GHOST");
    connect(&hq, &ghost, 1).await;

    // Assert
    assert!(!hq.relay.is_banned(localhost()).await);
    assert_eq!(hq.relay.failed_attempts(localhost()).await, 0);
}

#[tokio::test]
async fn test_ban_removes_live_sessions_from_that_address() {
    let hq = start_hq().await;
    let ghost = agent(&hq, PASSWORD, "GHOST");
    connect(&hq, &ghost, 1).await;

    let removed = hq.relay.ban(localhost()).await;

    assert_eq!(removed, 1);
    common::wait_for_sessions(&hq, 0).await;
}

/// Linux routes all of 127.0.0.0/8 to loopback, so a second source address
/// is available without any setup.
#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_ban_does_not_affect_other_addresses() {
    use tokio::net::TcpSocket;

    // Arrange: ban 127.0.0.1 through failures.
    let hq = start_hq().await;
    for _ in 0..3 {
        failed_attempt(&hq).await;
    }
    assert!(hq.relay.is_banned(localhost()).await);

    // Act: connect from 127.0.0.2 and wait for the first beacon.
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.2:0".parse().unwrap()).unwrap();
    let mut stream = socket.connect(hq.addr).await.unwrap();
    let mut first = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut first)).await;

    // Assert
    assert!(matches!(read, Ok(Ok(1))), "unbanned address must be sent a beacon");
    let other: IpAddr = "127.0.0.2".parse().unwrap();
    assert!(!hq.relay.is_banned(other).await);
    assert_eq!(hq.relay.failed_attempts(other).await, 0);
}

#[tokio::test]
async fn test_ban_during_handshake_refuses_admission() {
    use shield_core::net::{write_frame, FrameReader};
    use shield_core::protocol::Envelope;

    // Arrange: a peer that holds the password and has seen the first beacon.
    let hq = start_hq().await;
    let envelope = Envelope::sealed(PASSWORD).unwrap();
    let stream = TcpStream::connect(hq.addr).await.unwrap();
    let (r, mut w) = stream.into_split();
    let mut reader = FrameReader::new(r);
    let beacon = tokio::time::timeout(WAIT, reader.next_frame())
        .await
        .expect("HQ must beacon")
        .unwrap()
        .expect("stream open");
    assert_eq!(envelope.open_text(&beacon).unwrap(), "AUTH_REQUEST");

    // Act: the moderator bans the address before the peer answers.
    hq.relay.ban(localhost()).await;
    let ack = envelope.seal_frame(b"AUTH_ACK:ghost").unwrap();
    write_frame(&mut w, &ack, None).await.unwrap();

    // Assert: HQ hangs up and never registers the session.
    let drained = tokio::time::timeout(WAIT, async {
        while let Ok(Some(_)) = reader.next_frame().await {}
    })
    .await;
    assert!(drained.is_ok(), "HQ must close the connection");
    assert_eq!(hq.relay.session_count().await, 0);
    assert!(hq.relay.is_banned(localhost()).await);
}
