//! # Peer
//!
//! One live TCP connection plus its direction flag.
//!
//! A [`Peer`] owns the read half of the socket and is consumed by its read
//! loop. A [`PeerHandle`] is the cloneable, non-owning side: it can write to
//! the connection and close it, and is what the server keeps in its
//! registry.
//!
//! Writes go through a per-peer mutex, so concurrent senders to the same
//! peer never interleave their bytes.

use crate::config::ServerConfig;
use crate::core::codec::{Framing, PayloadCodec};
use crate::error::{ProtocolError, Result};
use crate::protocol::message::Message;
use crate::utils::timeout::with_timeout_error;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::{Encoder, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

static NEXT_PEER_ID: AtomicU64 = AtomicU64::new(1);

/// Per-connection settings derived from the server configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerOptions {
    pub framing: Framing,
    pub read_buffer_size: usize,
    pub max_frame_size: usize,
    pub read_timeout: Option<Duration>,
}

impl Default for PeerOptions {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

impl PeerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            framing: config.framing,
            read_buffer_size: config.read_buffer_size,
            max_frame_size: config.max_frame_size,
            read_timeout: config.read_timeout,
        }
    }

    fn codec(&self) -> PayloadCodec {
        PayloadCodec::new(self.framing, self.read_buffer_size, self.max_frame_size)
    }
}

/// Why a read loop stopped
#[derive(Debug)]
pub enum ReadLoopExit {
    /// The remote side closed the connection
    Eof,
    /// The connection was closed locally
    Closed,
    /// No data arrived within the read timeout
    TimedOut,
    /// The message channel has no receiver left
    ReceiverGone,
    /// Reading or decoding failed
    Failed(ProtocolError),
}

/// Cloneable write/close side of a connection
#[derive(Debug, Clone)]
pub struct PeerHandle {
    id: u64,
    remote_addr: SocketAddr,
    outbound: bool,
    options: PeerOptions,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    closed: CancellationToken,
}

impl PeerHandle {
    /// Process-unique id of this connection
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// `true` when this node dialed the connection
    pub fn is_outbound(&self) -> bool {
        self.outbound
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Write `data` to the connection as-is.
    ///
    /// No retry and no buffering: any write failure is returned.
    pub async fn send(&self, data: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }

        let mut writer = self.writer.lock().await;
        writer.write_all(data).await?;
        writer.flush().await?;
        trace!(peer = %self.remote_addr, bytes = data.len(), "Sent");
        Ok(())
    }

    /// Write one application payload using the configured framing.
    pub async fn send_message(&self, payload: Bytes) -> Result<()> {
        let mut buf = BytesMut::with_capacity(payload.len() + 4);
        self.options.codec().encode(payload, &mut buf)?;
        self.send(&buf).await
    }

    /// Close the connection and stop its read loop.
    ///
    /// Closing an already-closed peer is a no-op.
    pub async fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            trace!(peer = %self.remote_addr, error = %e, "Shutdown on closed socket");
        }
        debug!(peer = %self.remote_addr, "Connection closed");
    }
}

/// A live connection that has not yet started its read loop
#[derive(Debug)]
pub struct Peer {
    handle: PeerHandle,
    reader: OwnedReadHalf,
}

impl Peer {
    /// Wrap a connected stream. `outbound` is fixed for the peer's lifetime.
    pub fn new(stream: TcpStream, outbound: bool, options: PeerOptions) -> Result<Self> {
        let remote_addr = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();

        Ok(Self {
            handle: PeerHandle {
                id: NEXT_PEER_ID.fetch_add(1, Ordering::Relaxed),
                remote_addr,
                outbound,
                options,
                writer: Arc::new(Mutex::new(writer)),
                closed: CancellationToken::new(),
            },
            reader,
        })
    }

    pub fn handle(&self) -> &PeerHandle {
        &self.handle
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.handle.remote_addr
    }

    pub fn is_outbound(&self) -> bool {
        self.handle.outbound
    }

    pub async fn send(&self, data: &[u8]) -> Result<()> {
        self.handle.send(data).await
    }

    pub async fn close(&self) {
        self.handle.close().await
    }

    pub(crate) fn reader_mut(&mut self) -> &mut OwnedReadHalf {
        &mut self.reader
    }

    /// Read payloads until the connection ends, forwarding each as a
    /// [`Message`] tagged with this peer's address.
    ///
    /// Messages are forwarded in the order they were read. On exit the
    /// connection is closed; removing the peer from any registry is left to
    /// the caller.
    #[instrument(skip(self, msg_tx), fields(peer = %self.handle.remote_addr))]
    pub async fn read_loop(self, msg_tx: mpsc::Sender<Message>) -> ReadLoopExit {
        let Peer { handle, reader } = self;
        let options = handle.options;
        let mut frames =
            FramedRead::with_capacity(reader, options.codec(), options.read_buffer_size.max(1));

        let exit = loop {
            let next = tokio::select! {
                _ = handle.closed.cancelled() => break ReadLoopExit::Closed,
                next = with_timeout_error(
                    async { Ok::<_, ProtocolError>(frames.next().await) },
                    options.read_timeout,
                ) => next,
            };

            match next {
                Err(ProtocolError::Timeout) => break ReadLoopExit::TimedOut,
                Err(e) => break ReadLoopExit::Failed(e),
                Ok(None) => break ReadLoopExit::Eof,
                Ok(Some(Err(ProtocolError::Io(e)))) => {
                    break ReadLoopExit::Failed(ProtocolError::ReadFailure(e))
                }
                Ok(Some(Err(e))) => break ReadLoopExit::Failed(e),
                Ok(Some(Ok(payload))) => {
                    trace!(bytes = payload.len(), "Payload read");
                    let msg = Message::new(payload, handle.remote_addr);
                    if msg_tx.send(msg).await.is_err() {
                        break ReadLoopExit::ReceiverGone;
                    }
                }
            }
        };

        handle.close().await;
        debug!(?exit, "Read loop finished");
        exit
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn pair(options: PeerOptions) -> (Peer, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server_side, _) = listener.accept().await.unwrap();
        (Peer::new(server_side, false, options).unwrap(), client)
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let (a, _ca) = pair(PeerOptions::default()).await;
        let (b, _cb) = pair(PeerOptions::default()).await;
        assert_ne!(a.handle().id(), b.handle().id());
        assert!(!a.is_outbound());
    }

    #[tokio::test]
    async fn test_send_reaches_remote() {
        let (peer, mut remote) = pair(PeerOptions::default()).await;
        peer.send(b"fold").await.unwrap();

        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"fold");
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (peer, _remote) = pair(PeerOptions::default()).await;
        peer.close().await;
        assert!(matches!(
            peer.send(b"x").await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_read_loop_forwards_and_ends_on_eof() {
        let (peer, mut remote) = pair(PeerOptions::default()).await;
        let addr = peer.remote_addr();
        let (tx, mut rx) = mpsc::channel(8);
        let task = tokio::spawn(peer.read_loop(tx));

        remote.write_all(b"check").await.unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.payload, "check");
        assert_eq!(msg.from, addr);

        drop(remote);
        assert!(matches!(task.await.unwrap(), ReadLoopExit::Eof));
    }

    #[tokio::test]
    async fn test_read_loop_stops_when_closed_locally() {
        let (peer, _remote) = pair(PeerOptions::default()).await;
        let handle = peer.handle().clone();
        let (tx, _rx) = mpsc::channel(8);
        let task = tokio::spawn(peer.read_loop(tx));

        handle.close().await;
        assert!(matches!(task.await.unwrap(), ReadLoopExit::Closed));
    }

    #[tokio::test]
    async fn test_read_loop_times_out_when_idle() {
        let options = PeerOptions {
            read_timeout: Some(Duration::from_millis(50)),
            ..PeerOptions::default()
        };
        let (peer, _remote) = pair(options).await;
        let (tx, _rx) = mpsc::channel(8);

        assert!(matches!(peer.read_loop(tx).await, ReadLoopExit::TimedOut));
    }

    #[tokio::test]
    async fn test_length_delimited_send_message() {
        let options = PeerOptions {
            framing: Framing::LengthDelimited,
            ..PeerOptions::default()
        };
        let (peer, mut remote) = pair(options).await;
        peer.handle()
            .send_message(Bytes::from_static(b"all-in"))
            .await
            .unwrap();

        let mut buf = [0u8; 10];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..4], &6u32.to_be_bytes());
        assert_eq!(&buf[4..], b"all-in");
    }
}
