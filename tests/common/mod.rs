//! Shared helpers for integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use poker_p2p::core::codec::read_frame;
use poker_p2p::{
    GameStatus, GameVariant, Handshake, Message, PeerInfo, ProtocolError, Result, ServerConfig,
    ServerHandle,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Loopback config on an ephemeral port with short deadlines.
pub fn test_config(version: &str, variant: GameVariant) -> ServerConfig {
    let mut config = ServerConfig::new("127.0.0.1:0", version, variant);
    config.handshake_timeout = Some(Duration::from_secs(2));
    config
}

/// Handler that forwards every message to the returned receiver.
pub fn collecting_handler() -> (
    impl Fn(Message) -> Result<()> + Send + Sync + 'static,
    mpsc::UnboundedReceiver<Message>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |msg: Message| -> Result<()> {
        tx.send(msg)
            .map_err(|e| ProtocolError::HandlerFailure(e.to_string()))
    };
    (handler, rx)
}

/// Poll the registry until it holds exactly `expected` peers.
pub async fn wait_for_peers(server: &ServerHandle, expected: usize) -> Vec<PeerInfo> {
    for _ in 0..200 {
        let peers = server.peers().await.expect("server running");
        if peers.len() == expected {
            return peers;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "registry never reached {expected} peers, has {:?}",
        server.peers().await
    );
}

/// Dial `addr` as a bare TCP client and send `handshake`.
pub async fn raw_dial(addr: SocketAddr, handshake: &Handshake) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&handshake.encode().unwrap()).await.unwrap();
    stream
}

/// Read the server's handshake reply.
pub async fn read_reply(stream: &mut TcpStream) -> Handshake {
    let body = tokio::time::timeout(Duration::from_secs(2), read_frame(stream))
        .await
        .expect("reply in time")
        .expect("reply frame");
    Handshake::decode(&body).unwrap()
}

/// Dial, handshake and wait for the reply.
pub async fn raw_connect(addr: SocketAddr, version: &str) -> TcpStream {
    let hs = Handshake::new(version, GameVariant::TexasHoldem, GameStatus::Waiting);
    let mut stream = raw_dial(addr, &hs).await;
    read_reply(&mut stream).await;
    stream
}

/// `true` once the remote side has closed the connection.
pub async fn closed_by_remote(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    match tokio::time::timeout(Duration::from_secs(3), stream.read(&mut buf)).await {
        Ok(Ok(0)) | Ok(Err(_)) => true,
        Ok(Ok(_)) | Err(_) => false,
    }
}
