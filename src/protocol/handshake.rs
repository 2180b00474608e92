//! Version/variant handshake exchanged once per connection.
//!
//! Each side sends one [`Handshake`] before the connection is considered
//! connected. The side that dialed speaks first; the accepting side replies
//! only after the dialer's handshake passed [`check_compatibility`].
//!
//! The handshake is read straight off the socket with exact reads, never
//! through the message channel, and before the peer's read loop starts.

use crate::core::codec::{self, MAX_HANDSHAKE_SIZE};
use crate::error::{ProtocolError, Result};
use crate::protocol::game::{GameStatus, GameVariant};
use crate::transport::peer::{Peer, PeerHandle};
use crate::utils::timeout::with_timeout_error;

use bincode::Options;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// The handshake envelope. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub version: String,
    pub variant: GameVariant,
    pub status: GameStatus,
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_HANDSHAKE_SIZE as u64)
        .reject_trailing_bytes()
}

impl Handshake {
    pub fn new(version: impl Into<String>, variant: GameVariant, status: GameStatus) -> Self {
        Self {
            version: version.into(),
            variant,
            status,
        }
    }

    /// Serialize into a complete wire frame (header + body).
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = wire_options().serialize(self)?;
        codec::encode_frame(&body)
    }

    /// Deserialize a frame body.
    pub fn decode(body: &[u8]) -> Result<Self> {
        wire_options()
            .deserialize(body)
            .map_err(|e| ProtocolError::HandshakeDecode(e.to_string()))
    }

    /// Deserialize a complete wire frame.
    pub fn from_frame(frame: &[u8]) -> Result<Self> {
        let len = codec::parse_header(frame)?;
        let body = frame
            .get(codec::HEADER_SIZE..codec::HEADER_SIZE + len)
            .ok_or_else(|| ProtocolError::HandshakeDecode("truncated frame".into()))?;
        Self::decode(body)
    }
}

/// Check a remote handshake against the local identity.
///
/// The variant is compared first, then the version by exact string
/// equality. There is no semantic-version tolerance.
pub fn check_compatibility(
    local_variant: GameVariant,
    local_version: &str,
    remote: &Handshake,
) -> Result<()> {
    if local_variant != remote.variant {
        return Err(ProtocolError::VariantMismatch {
            local: local_variant,
            remote: remote.variant,
        });
    }

    if local_version != remote.version {
        return Err(ProtocolError::VersionMismatch {
            local: local_version.to_string(),
            remote: remote.version.clone(),
        });
    }

    Ok(())
}

/// Write our handshake to `peer`.
#[instrument(skip(peer, handshake), fields(peer = %peer.remote_addr()))]
pub async fn send_handshake(peer: &PeerHandle, handshake: &Handshake) -> Result<()> {
    let frame = handshake.encode()?;
    peer.send(&frame).await?;
    debug!(
        version = %handshake.version,
        variant = %handshake.variant,
        status = %handshake.status,
        "Handshake sent"
    );
    Ok(())
}

/// Read exactly one handshake from `peer`, waiting at most `deadline`.
#[instrument(skip(peer), fields(peer = %peer.remote_addr()))]
pub async fn receive_handshake(peer: &mut Peer, deadline: Option<Duration>) -> Result<Handshake> {
    let reader = peer.reader_mut();
    let body = with_timeout_error(codec::read_frame(reader), deadline).await?;
    Handshake::decode(&body)
}
