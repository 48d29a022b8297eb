//! Integration tests for the shield-core handshake over real TCP sockets.
//!
//! These tests exercise address resolution, dial/listen, frame I/O, the
//! envelope and both handshake drivers together on 127.0.0.1.

use std::time::Duration;

use shield_core::net::{dial, listen, resolve_address, write_frame, FrameReader};
use shield_core::{
    accept_handshake, initiate_handshake, AcceptorOutcome, Envelope, HandshakeConfig,
    InitiatorOutcome, Message,
};

fn test_config() -> HandshakeConfig {
    HandshakeConfig {
        beacon_attempts: 5,
        beacon_interval: Duration::from_millis(100),
        session_ceiling: Duration::from_secs(3),
    }
}

/// Runs one acceptor against one initiator and returns both outcomes.
async fn run_pair(hq_password: &str, agent_password: &str) -> (AcceptorOutcome, InitiatorOutcome) {
    let listener = listen("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let target = resolve_address(&format!("tcp://127.0.0.1:{port}")).unwrap();
    let hq_env = Envelope::sealed(hq_password).unwrap();
    let agent_env = Envelope::sealed(agent_password).unwrap();
    let cfg = test_config();

    let hq_cfg = cfg.clone();
    let hq = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (r, mut w) = stream.into_split();
        let mut reader = FrameReader::new(r);
        accept_handshake(&mut reader, &mut w, &hq_env, &hq_cfg).await.unwrap()
    });

    let stream = dial(&target, Duration::from_secs(2)).await.unwrap();
    let (r, mut w) = stream.into_split();
    let mut reader = FrameReader::new(r);
    let agent = initiate_handshake(&mut reader, &mut w, &agent_env, &cfg, Some("echo"))
        .await
        .unwrap();

    (hq.await.unwrap(), agent)
}

#[tokio::test]
async fn test_loopback_same_password_authenticates() {
    let (hq, agent) = run_pair("ALPHA-77", "ALPHA-77").await;

    assert_eq!(
        hq,
        AcceptorOutcome::Authenticated {
            client_name: Some("echo".to_string())
        }
    );
    assert_eq!(agent, InitiatorOutcome::Authenticated);
}

#[tokio::test]
async fn test_loopback_wrong_password_is_silence() {
    let (hq, agent) = run_pair("ALPHA-77", "WRONG").await;

    assert_eq!(hq, AcceptorOutcome::TimedOut);
    assert_eq!(agent, InitiatorOutcome::TimedOut);
}

#[tokio::test]
async fn test_loopback_sealed_chat_after_handshake() {
    // Arrange
    let listener = listen("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let target = resolve_address(&format!("127.0.0.1:{port}")).unwrap();
    let env = Envelope::sealed("ALPHA-77").unwrap();
    let cfg = test_config();

    let hq_env = env.clone();
    let hq_cfg = cfg.clone();
    let hq = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (r, mut w) = stream.into_split();
        let mut reader = FrameReader::new(r);
        accept_handshake(&mut reader, &mut w, &hq_env, &hq_cfg).await.unwrap();
        let frame = reader.next_frame().await.unwrap().unwrap();
        hq_env.open_text(&frame).unwrap()
    });

    let stream = dial(&target, Duration::from_secs(2)).await.unwrap();
    let (r, mut w) = stream.into_split();
    let mut reader = FrameReader::new(r);
    let outcome = initiate_handshake(&mut reader, &mut w, &env, &cfg, None)
        .await
        .unwrap();
    assert_eq!(outcome, InitiatorOutcome::Authenticated);

    // Act
    let line = Message::radio_line("echo", "contact north");
    let body = env.seal_frame(line.as_bytes()).unwrap();
    write_frame(&mut w, &body, Some(Duration::from_secs(1))).await.unwrap();

    // Assert
    let received = hq.await.unwrap();
    assert_eq!(Message::classify(&received), Message::Radio("contact north".to_string()));
}
