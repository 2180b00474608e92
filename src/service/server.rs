//! # Game Server
//!
//! The coordinator. It owns the peer registry and runs the single
//! coordination loop that is the only code allowed to read or write it.
//!
//! ## Event flow
//! ```text
//! TcpTransport ──add-peer──▶ ┌────────────────────┐ ──▶ Handler
//! connect()    ──add-peer──▶ │ coordination loop  │
//! handshakes   ──handshaken─▶ │  (owns registry)   │
//! read loops   ──message───▶ │                    │
//! read loops   ──del-peer──▶ └────────────────────┘
//! ```
//!
//! Each new peer's handshake runs on its own task, so a slow or silent
//! connection never stalls the loop. Only the loop inserts into the
//! registry, once the task reports a validated handshake.
//!
//! ## Connection lifecycle
//! `Connecting → Handshaking → Connected → Disconnected`. A handshake
//! failure closes the connection without registering it; a read loop
//! ending or a handler failure removes the peer and closes it. No state is
//! re-entered, though a later connection may reuse the same address.

use crate::config::ServerConfig;
use crate::error::{ProtocolError, Result};
use crate::protocol::game::{GameState, GameStatus};
use crate::protocol::handler::{DefaultHandler, Handler};
use crate::protocol::handshake::{check_compatibility, receive_handshake, send_handshake, Handshake};
use crate::protocol::message::Message;
use crate::transport::peer::{Peer, PeerHandle, PeerOptions, ReadLoopExit};
use crate::transport::tcp::TcpTransport;
use crate::utils::metrics::{Metrics, MetricsSnapshot, Timer};
use crate::utils::timeout::SHUTDOWN_TIMEOUT;

use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Registry entry as seen from outside the coordination loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub addr: SocketAddr,
    pub outbound: bool,
    /// The handshake the peer announced
    pub handshake: Handshake,
}

/// Requests served by the coordination loop on behalf of a [`ServerHandle`]
enum Command {
    Peers(oneshot::Sender<Vec<PeerInfo>>),
    SendTo {
        addr: SocketAddr,
        payload: Bytes,
        reply: oneshot::Sender<Result<()>>,
    },
    Broadcast {
        payload: Bytes,
        reply: oneshot::Sender<usize>,
    },
    Disconnect {
        addr: SocketAddr,
        reply: oneshot::Sender<bool>,
    },
}

/// Posted by a handshake task once the remote's handshake passed
struct Handshaken {
    peer: Peer,
    handshake: Handshake,
}

/// Posted by a peer task once its read loop has ended
#[derive(Debug)]
struct PeerGone {
    addr: SocketAddr,
    id: u64,
    exit: ReadLoopExit,
}

struct RegisteredPeer {
    handle: PeerHandle,
    handshake: Handshake,
}

/// A configured, not yet started server
pub struct Server {
    config: Arc<ServerConfig>,
    handler: Arc<dyn Handler>,
    game_state: Arc<GameState>,
    metrics: Arc<Metrics>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            handler: Arc::new(DefaultHandler),
            game_state: Arc::new(GameState::new()),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Replace the default logging handler
    pub fn with_handler<H: Handler>(mut self, handler: H) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Share game state with the game-logic collaborator
    pub fn with_game_state(mut self, game_state: Arc<GameState>) -> Self {
        self.game_state = game_state;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn game_state(&self) -> Arc<GameState> {
        self.game_state.clone()
    }

    /// Bind the listener and spawn the accept and coordination loops.
    ///
    /// A bind failure is returned here, once.
    pub async fn start(self) -> Result<ServerHandle> {
        let options = PeerOptions::from_config(&self.config);
        let transport =
            TcpTransport::bind(&self.config.listen_addr, options, self.metrics.clone()).await?;
        let local_addr = transport.local_addr();

        let capacity = self.config.backpressure_limit.max(1);
        let (add_tx, add_rx) = mpsc::channel(capacity);
        let (ready_tx, ready_rx) = mpsc::channel(capacity);
        let (del_tx, del_rx) = mpsc::channel(capacity);
        let (msg_tx, msg_rx) = mpsc::channel(capacity);
        let (cmd_tx, cmd_rx) = mpsc::channel(capacity);
        let shutdown = CancellationToken::new();

        let coordinator = Coordinator {
            config: self.config.clone(),
            handler: self.handler,
            game_state: self.game_state.clone(),
            metrics: self.metrics.clone(),
            peers: HashMap::new(),
            add_rx,
            ready_tx,
            ready_rx,
            del_tx,
            del_rx,
            msg_tx,
            msg_rx,
            cmd_rx,
            shutdown: shutdown.clone(),
        };

        let loop_task = tokio::spawn(coordinator.run());
        tokio::spawn(transport.accept_loop(add_tx.clone(), shutdown.clone()));

        info!(
            addr = %local_addr,
            variant = %self.config.variant,
            version = %self.config.version,
            "Started new game server"
        );

        Ok(ServerHandle {
            local_addr,
            config: self.config,
            options,
            game_state: self.game_state,
            metrics: self.metrics,
            add_peer: add_tx,
            commands: cmd_tx,
            shutdown,
            loop_task: Arc::new(Mutex::new(Some(loop_task))),
        })
    }

    /// Start the server and keep it running until CTRL+C or until
    /// [`ServerHandle::shutdown`] is called from elsewhere.
    pub async fn run(self) -> Result<()> {
        let handle = self.start().await?;

        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!(error = %e, "Failed to listen for CTRL+C");
                }
                info!("Received CTRL+C signal, shutting down");
            }
            _ = handle.shutdown.cancelled() => {}
        }

        handle.shutdown().await;
        Ok(())
    }
}

/// Cloneable control surface of a running server
#[derive(Clone)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    config: Arc<ServerConfig>,
    options: PeerOptions,
    game_state: Arc<GameState>,
    metrics: Arc<Metrics>,
    add_peer: mpsc::Sender<Peer>,
    commands: mpsc::Sender<Command>,
    shutdown: CancellationToken,
    loop_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ServerHandle {
    /// Address the listener actually bound
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Dial `addr` and hand the connection to the coordination loop.
    ///
    /// Returns once our handshake has been written. Registration happens
    /// asynchronously, after the remote's handshake is received and checked.
    #[instrument(skip(self))]
    pub async fn connect(&self, addr: &str) -> Result<PeerHandle> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ProtocolError::DialFailure {
                addr: addr.to_string(),
                source,
            })?;

        let peer = Peer::new(stream, true, self.options)?;
        let handle = peer.handle().clone();
        self.metrics.connection_dialed();

        self.add_peer
            .send(peer)
            .await
            .map_err(|_| ProtocolError::ServerStopped)?;

        send_handshake(&handle, &local_handshake(&self.config, &self.game_state)).await?;
        Ok(handle)
    }

    /// Snapshot of the registry, read by the coordination loop
    pub async fn peers(&self) -> Result<Vec<PeerInfo>> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Peers(reply)).await?;
        rx.await.map_err(|_| ProtocolError::ServerStopped)
    }

    pub async fn peer_count(&self) -> Result<usize> {
        Ok(self.peers().await?.len())
    }

    /// Send one payload to a registered peer
    pub async fn send_to(&self, addr: SocketAddr, payload: impl Into<Bytes>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::SendTo {
            addr,
            payload: payload.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ProtocolError::ServerStopped)?
    }

    /// Send one payload to every registered peer, returning how many
    /// writes succeeded
    pub async fn broadcast(&self, payload: impl Into<Bytes>) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Broadcast {
            payload: payload.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ProtocolError::ServerStopped)
    }

    /// Close and unregister a peer. Returns `false` if it was not registered.
    pub async fn disconnect(&self, addr: SocketAddr) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Disconnect { addr, reply }).await?;
        rx.await.map_err(|_| ProtocolError::ServerStopped)
    }

    /// Status embedded in handshakes sent from now on
    pub fn set_game_status(&self, status: GameStatus) {
        self.game_state.set_status(status);
    }

    pub fn game_status(&self) -> GameStatus {
        self.game_state.status()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop accepting, close every peer and wait for the coordination loop.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let task = self.loop_task.lock().await.take();
        if let Some(task) = task {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Coordination loop panicked"),
                Err(_) => warn!("Shutdown timeout reached, coordination loop still running"),
            }
        }
    }

    async fn request(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ProtocolError::ServerStopped)
    }
}

fn local_handshake(config: &ServerConfig, game_state: &GameState) -> Handshake {
    Handshake::new(config.version.clone(), config.variant, game_state.status())
}

/// State owned by the coordination loop. Nothing else touches `peers`.
struct Coordinator {
    config: Arc<ServerConfig>,
    handler: Arc<dyn Handler>,
    game_state: Arc<GameState>,
    metrics: Arc<Metrics>,
    peers: HashMap<SocketAddr, RegisteredPeer>,
    add_rx: mpsc::Receiver<Peer>,
    ready_tx: mpsc::Sender<Handshaken>,
    ready_rx: mpsc::Receiver<Handshaken>,
    del_tx: mpsc::Sender<PeerGone>,
    del_rx: mpsc::Receiver<PeerGone>,
    msg_tx: mpsc::Sender<Message>,
    msg_rx: mpsc::Receiver<Message>,
    cmd_rx: mpsc::Receiver<Command>,
    shutdown: CancellationToken,
}

impl Coordinator {
    async fn run(mut self) {
        loop {
            // No priority between ready inputs.
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                Some(peer) = self.add_rx.recv() => self.start_handshake(peer),
                Some(ready) = self.ready_rx.recv() => self.add_peer(ready).await,
                Some(gone) = self.del_rx.recv() => self.remove_peer(gone),
                Some(msg) = self.msg_rx.recv() => self.dispatch(msg).await,
                Some(cmd) = self.cmd_rx.recv() => self.command(cmd).await,
            }
        }

        for (_, entry) in self.peers.drain() {
            entry.handle.close().await;
            self.metrics.peer_removed();
        }
        self.metrics.log_metrics();
        info!(addr = %self.config.listen_addr, "Game server stopped");
    }

    fn start_handshake(&self, peer: Peer) {
        let task = HandshakeTask {
            config: self.config.clone(),
            game_state: self.game_state.clone(),
            metrics: self.metrics.clone(),
            ready_tx: self.ready_tx.clone(),
            shutdown: self.shutdown.clone(),
        };
        tokio::spawn(task.run(peer));
    }

    async fn add_peer(&mut self, ready: Handshaken) {
        let Handshaken { peer, handshake } = ready;
        let addr = peer.remote_addr();
        let handle = peer.handle().clone();
        if handle.is_closed() {
            debug!(peer = %addr, "Peer closed before registration");
            return;
        }

        let id = handle.id();
        let msg_tx = self.msg_tx.clone();
        let del_tx = self.del_tx.clone();
        tokio::spawn(async move {
            let exit = peer.read_loop(msg_tx).await;
            // The coordination loop may already be gone during shutdown.
            let _ = del_tx.send(PeerGone { addr, id, exit }).await;
        });

        if let Some(stale) = self.peers.remove(&addr) {
            warn!(peer = %addr, "Replacing stale registry entry");
            stale.handle.close().await;
            self.metrics.peer_removed();
        }

        self.peers.insert(addr, RegisteredPeer { handle, handshake });
        self.metrics.peer_registered();
        info!(peer = %addr, peers = self.peers.len(), "New player connected");
    }

    fn remove_peer(&mut self, gone: PeerGone) {
        let current = self
            .peers
            .get(&gone.addr)
            .map(|entry| entry.handle.id());

        if current == Some(gone.id) {
            self.peers.remove(&gone.addr);
            self.metrics.peer_removed();
            info!(peer = %gone.addr, reason = ?gone.exit, "Player disconnected");
        } else {
            debug!(peer = %gone.addr, "Peer not registered, nothing to remove");
        }
    }

    async fn dispatch(&mut self, msg: Message) {
        let from = msg.from;
        if !self.peers.contains_key(&from) {
            debug!(peer = %from, bytes = msg.len(), "Dropping message from removed peer");
            return;
        }

        self.metrics.message_received(msg.len() as u64);
        debug!(peer = %from, bytes = msg.len(), "Dispatching message");

        if let Err(e) = self.handler.handle_message(msg) {
            self.metrics.handler_error();
            error!(peer = %from, error = %e, "Handler failed, closing connection");

            if let Some(entry) = self.peers.remove(&from) {
                entry.handle.close().await;
                self.metrics.peer_removed();
            }
        }
    }

    async fn command(&mut self, command: Command) {
        match command {
            Command::Peers(reply) => {
                let peers = self
                    .peers
                    .iter()
                    .map(|(addr, entry)| PeerInfo {
                        addr: *addr,
                        outbound: entry.handle.is_outbound(),
                        handshake: entry.handshake.clone(),
                    })
                    .collect();
                let _ = reply.send(peers);
            }
            Command::SendTo {
                addr,
                payload,
                reply,
            } => {
                let result = match self.peers.get(&addr) {
                    Some(entry) => self.send_payload(&entry.handle, payload).await,
                    None => Err(ProtocolError::UnknownPeer(addr)),
                };
                let _ = reply.send(result);
            }
            Command::Broadcast { payload, reply } => {
                let mut delivered = 0;
                for entry in self.peers.values() {
                    match self.send_payload(&entry.handle, payload.clone()).await {
                        Ok(()) => delivered += 1,
                        Err(e) => {
                            warn!(peer = %entry.handle.remote_addr(), error = %e, "Broadcast write failed")
                        }
                    }
                }
                let _ = reply.send(delivered);
            }
            Command::Disconnect { addr, reply } => {
                let removed = match self.peers.remove(&addr) {
                    Some(entry) => {
                        entry.handle.close().await;
                        self.metrics.peer_removed();
                        info!(peer = %addr, "Player disconnected by operator");
                        true
                    }
                    None => false,
                };
                let _ = reply.send(removed);
            }
        }
    }

    async fn send_payload(&self, handle: &PeerHandle, payload: Bytes) -> Result<()> {
        let len = payload.len() as u64;
        handle.send_message(payload).await?;
        self.metrics.message_sent(len);
        Ok(())
    }
}

/// Runs one peer's handshake off the coordination loop
struct HandshakeTask {
    config: Arc<ServerConfig>,
    game_state: Arc<GameState>,
    metrics: Arc<Metrics>,
    ready_tx: mpsc::Sender<Handshaken>,
    shutdown: CancellationToken,
}

impl HandshakeTask {
    async fn run(self, mut peer: Peer) {
        let addr = peer.remote_addr();
        let result = {
            let _timer = Timer::start("handshake");
            tokio::select! {
                _ = self.shutdown.cancelled() => Err(ProtocolError::ServerStopped),
                result = self.exchange(&mut peer) => result,
            }
        };

        match result {
            Ok(handshake) => {
                if self.ready_tx.send(Handshaken { peer, handshake }).await.is_err() {
                    debug!(peer = %addr, "Coordination loop gone, dropping peer");
                }
            }
            Err(e) => {
                warn!(peer = %addr, error = %e, "Handshake with player failed");
                self.metrics.handshake_failed();
                peer.close().await;
            }
        }
    }

    /// Receive, check and (for inbound peers) answer a handshake.
    async fn exchange(&self, peer: &mut Peer) -> Result<Handshake> {
        let remote = receive_handshake(peer, self.config.handshake_timeout).await?;
        check_compatibility(self.config.variant, &self.config.version, &remote)?;

        info!(
            peer = %peer.remote_addr(),
            version = %remote.version,
            variant = %remote.variant,
            status = %remote.status,
            "Handshake received"
        );

        // Outbound peers already sent ours from `connect`.
        if !peer.is_outbound() {
            send_handshake(peer.handle(), &local_handshake(&self.config, &self.game_state)).await?;
        }

        Ok(remote)
    }
}
