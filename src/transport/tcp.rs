//! # TCP Transport
//!
//! Owns the listening socket. Every accepted connection is wrapped in an
//! inbound [`Peer`] and published on the add-peer channel; the transport
//! never touches the peer registry itself.
//!
//! There is no backpressure on accepting beyond the channel capacity and no
//! connection-rate limiting.

use crate::error::{ProtocolError, Result};
use crate::transport::peer::{Peer, PeerOptions};
use crate::utils::metrics::Metrics;

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Accepts inbound connections on a bound listener
#[derive(Debug)]
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
    options: PeerOptions,
    metrics: Arc<Metrics>,
}

/// Accept `":9001"` as shorthand for all interfaces.
pub fn normalize_listen_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

impl TcpTransport {
    /// Bind the listening socket. Failure here is fatal and reported once.
    #[instrument(skip(options, metrics))]
    pub async fn bind(listen_addr: &str, options: PeerOptions, metrics: Arc<Metrics>) -> Result<Self> {
        let addr = normalize_listen_addr(listen_addr);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ProtocolError::BindFailure {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        info!(address = %local_addr, "Listening");
        Ok(Self {
            listener,
            local_addr,
            options,
            metrics,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` fires or the add-peer receiver is
    /// dropped.
    ///
    /// Accept errors are logged and accepting continues.
    pub async fn accept_loop(self, add_peer: mpsc::Sender<Peer>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(address = %self.local_addr, "Listener shutting down");
                    return;
                }

                accept_result = self.listener.accept() => {
                    let (stream, addr) = match accept_result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!(error = %e, "Error accepting connection");
                            continue;
                        }
                    };

                    let peer = match Peer::new(stream, false, self.options) {
                        Ok(peer) => peer,
                        Err(e) => {
                            warn!(peer = %addr, error = %e, "Dropping connection");
                            continue;
                        }
                    };

                    self.metrics.connection_accepted();
                    debug!(peer = %addr, "New connection established");

                    if add_peer.send(peer).await.is_err() {
                        warn!("Coordination loop gone, listener stopping");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;

    #[test]
    fn test_normalize_listen_addr() {
        assert_eq!(normalize_listen_addr(":9001"), "0.0.0.0:9001");
        assert_eq!(normalize_listen_addr("127.0.0.1:9001"), "127.0.0.1:9001");
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let metrics = Arc::new(Metrics::new());
        let first = TcpTransport::bind("127.0.0.1:0", PeerOptions::default(), metrics.clone())
            .await
            .unwrap();
        let taken = first.local_addr().to_string();

        let second = TcpTransport::bind(&taken, PeerOptions::default(), metrics).await;
        assert!(matches!(second, Err(ProtocolError::BindFailure { .. })));
    }

    #[tokio::test]
    async fn test_accepted_peers_are_inbound() {
        let metrics = Arc::new(Metrics::new());
        let transport = TcpTransport::bind("127.0.0.1:0", PeerOptions::default(), metrics.clone())
            .await
            .unwrap();
        let addr = transport.local_addr();
        let (tx, mut rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(transport.accept_loop(tx, shutdown.clone()));

        let client = TcpStream::connect(addr).await.unwrap();
        let peer = rx.recv().await.unwrap();
        assert!(!peer.is_outbound());
        assert_eq!(peer.remote_addr(), client.local_addr().unwrap());
        assert_eq!(metrics.snapshot().connections_accepted, 1);

        shutdown.cancel();
        task.await.unwrap();
    }
}
