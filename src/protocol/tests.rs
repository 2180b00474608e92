// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::error::ProtocolError;
use crate::protocol::game::{GameStatus, GameVariant};
use crate::protocol::handshake::*;
use crate::transport::peer::{Peer, PeerOptions};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

/// (dialer, acceptor) pair over loopback
async fn connected_peers() -> (Peer, Peer) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (dialed, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());

    let outbound = Peer::new(dialed.unwrap(), true, PeerOptions::default()).unwrap();
    let inbound = Peer::new(accepted.unwrap().0, false, PeerOptions::default()).unwrap();
    (outbound, inbound)
}

#[tokio::test]
async fn test_handshake_exchange_over_socket() {
    let (mut dialer, mut acceptor) = connected_peers().await;
    assert!(dialer.is_outbound());
    assert!(!acceptor.is_outbound());

    // =================== Step 1: Dialer speaks first ===================
    let ours = Handshake::new("v1", GameVariant::TexasHoldem, GameStatus::Waiting);
    send_handshake(dialer.handle(), &ours).await.unwrap();

    // =================== Step 2: Acceptor validates ===================
    let received = receive_handshake(&mut acceptor, Some(Duration::from_secs(2)))
        .await
        .expect("acceptor should read the handshake");
    assert_eq!(received, ours);
    check_compatibility(GameVariant::TexasHoldem, "v1", &received).unwrap();

    // =================== Step 3: Acceptor replies ===================
    let reply = Handshake::new("v1", GameVariant::TexasHoldem, GameStatus::Dealing);
    send_handshake(acceptor.handle(), &reply).await.unwrap();

    let answered = receive_handshake(&mut dialer, Some(Duration::from_secs(2)))
        .await
        .unwrap();
    assert_eq!(answered.status, GameStatus::Dealing);
}

#[tokio::test]
async fn test_receive_times_out_on_silent_peer() {
    let (_dialer, mut acceptor) = connected_peers().await;

    let result = receive_handshake(&mut acceptor, Some(Duration::from_millis(50))).await;
    assert!(matches!(result, Err(ProtocolError::Timeout)));
}

#[tokio::test]
async fn test_receive_reports_closed_connection() {
    let (dialer, mut acceptor) = connected_peers().await;
    drop(dialer);

    let result = receive_handshake(&mut acceptor, Some(Duration::from_secs(2))).await;
    assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
}

#[tokio::test]
async fn test_receive_rejects_bad_magic() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut raw = TcpStream::connect(addr).await.unwrap();
    let (accepted, _) = listener.accept().await.unwrap();
    let mut acceptor = Peer::new(accepted, false, PeerOptions::default()).unwrap();

    raw.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();

    let result = receive_handshake(&mut acceptor, Some(Duration::from_secs(2))).await;
    assert!(matches!(result, Err(ProtocolError::InvalidHeader)));
}

#[tokio::test]
async fn test_bytes_after_handshake_are_not_consumed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut raw = TcpStream::connect(addr).await.unwrap();
    let (accepted, _) = listener.accept().await.unwrap();
    let mut acceptor = Peer::new(accepted, false, PeerOptions::default()).unwrap();

    let hs = Handshake::new("v1", GameVariant::TexasHoldem, GameStatus::Waiting);
    let mut wire = hs.encode().unwrap();
    wire.extend_from_slice(b"first payload");
    raw.write_all(&wire).await.unwrap();

    receive_handshake(&mut acceptor, None).await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::channel(4);
    tokio::spawn(acceptor.read_loop(tx));
    let msg = rx.recv().await.unwrap();
    assert_eq!(msg.payload, "first payload");
}
