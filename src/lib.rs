//! # poker-p2p
//!
//! Peer-to-peer transport and session layer for a multiplayer card-game
//! server.
//!
//! Nodes accept inbound TCP connections and dial outbound ones, exchange a
//! versioned handshake to confirm they run the same game variant and
//! protocol version, and keep a live peer registry. A single coordination
//! loop owns that registry; listener, read loops and callers only reach it
//! through channels.
//!
//! ## Example
//! ```rust,no_run
//! use poker_p2p::{GameVariant, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> poker_p2p::Result<()> {
//!     let config = ServerConfig::new(":9001", "v1", GameVariant::TexasHoldem);
//!     let server = Server::new(config).start().await?;
//!
//!     server.connect("127.0.0.1:9002").await?;
//!     println!("peers: {:?}", server.peers().await?);
//!
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use config::{NetworkConfig, ServerConfig};
pub use error::{ProtocolError, Result};
pub use protocol::game::{GameState, GameStatus, GameVariant};
pub use protocol::handler::{DefaultHandler, Handler};
pub use protocol::handshake::Handshake;
pub use protocol::message::Message;
pub use service::server::{PeerInfo, Server, ServerHandle};
pub use transport::peer::{Peer, PeerHandle};
