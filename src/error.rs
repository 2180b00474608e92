//! # Error Types
//!
//! Error handling for the peer-to-peer transport.
//!
//! This module defines every failure the transport can surface, from socket
//! binding at startup down to a single peer's read loop ending.
//!
//! ## Error Categories
//! - **Process-level**: bind failures and invalid configuration
//! - **Connection-scoped**: dial, handshake decode, variant/version mismatch,
//!   read and handler failures. These close one connection and nothing else.
//! - **Framing**: invalid headers and oversized frames
//!
//! ## Example Usage
//! ```rust
//! use poker_p2p::error::{ProtocolError, Result};
//! use tracing::{error, info};
//!
//! fn parse_port(raw: &str) -> Result<u16> {
//!     raw.parse::<u16>()
//!         .map_err(|e| ProtocolError::ConfigError(format!("bad port: {e}")))
//! }
//!
//! fn main() {
//!     match parse_port("9001") {
//!         Ok(port) => info!(port, "Port parsed"),
//!         Err(e) => error!(error = %e, "Invalid port"),
//!     }
//! }
//! ```

use crate::protocol::game::GameVariant;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_TIMEOUT: &str = "Operation timed out";

    /// Framing errors
    pub const ERR_INVALID_HEADER: &str = "Invalid handshake header";
    pub const ERR_OVERSIZED_FRAME: &str = "Frame exceeds maximum size";

    /// Handshake errors
    pub const ERR_HANDSHAKE_EMPTY: &str = "Empty handshake body";
    pub const ERR_UNKNOWN_GAME_STATUS: &str = "Unknown game status";

    /// Server errors
    pub const ERR_SERVER_STOPPED: &str = "Coordination loop is no longer running";
}

// ProtocolError is the primary error type for all transport operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Failed to bind {addr}: {source}")]
    BindFailure {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to dial {addr}: {source}")]
    DialFailure {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Handshake decode failed: {0}")]
    HandshakeDecode(String),

    #[error("Game variant mismatch, local: {local} remote: {remote}")]
    VariantMismatch {
        local: GameVariant,
        remote: GameVariant,
    },

    #[error("Version mismatch, local: {local} remote: {remote}")]
    VersionMismatch { local: String, remote: String },

    #[error("Read failed: {0}")]
    ReadFailure(io::Error),

    #[error("Handler failed: {0}")]
    HandlerFailure(String),

    #[error("Invalid handshake header")]
    InvalidHeader,

    #[error("Frame too large: {0} bytes")]
    OversizedFrame(usize),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server stopped")]
    ServerStopped,

    #[error("Peer {0} is not registered")]
    UnknownPeer(SocketAddr),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether this failure only affects the connection it happened on.
    ///
    /// Bind and configuration errors are the only ones that should reach
    /// the process level.
    pub fn is_connection_scoped(&self) -> bool {
        !matches!(
            self,
            ProtocolError::BindFailure { .. }
                | ProtocolError::ConfigError(_)
                | ProtocolError::ServerStopped
        )
    }

    /// Whether this failure came out of the handshake exchange.
    pub fn is_handshake_failure(&self) -> bool {
        matches!(
            self,
            ProtocolError::HandshakeDecode(_)
                | ProtocolError::VariantMismatch { .. }
                | ProtocolError::VersionMismatch { .. }
                | ProtocolError::InvalidHeader
                | ProtocolError::OversizedFrame(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_classification() {
        let bind = ProtocolError::BindFailure {
            addr: "127.0.0.1:1".into(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert!(!bind.is_connection_scoped());
        assert!(!ProtocolError::ConfigError("x".into()).is_connection_scoped());

        assert!(ProtocolError::HandlerFailure("boom".into()).is_connection_scoped());
        assert!(ProtocolError::ReadFailure(io::ErrorKind::BrokenPipe.into()).is_connection_scoped());
    }

    #[test]
    fn test_mismatch_messages_name_both_sides() {
        let err = ProtocolError::VersionMismatch {
            local: "v1".into(),
            remote: "V1".into(),
        };
        let text = err.to_string();
        assert!(text.contains("v1"));
        assert!(text.contains("V1"));
        assert!(err.is_handshake_failure());

        let err = ProtocolError::VariantMismatch {
            local: GameVariant::TexasHoldem,
            remote: GameVariant::Reserved(1),
        };
        assert!(err.to_string().contains("Texas Hold'em"));
    }
}
