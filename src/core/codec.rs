//! Wire framing for handshakes and application payloads.
//!
//! ## Handshake frame
//! ```text
//! [Magic "PKGG"(4)] [Length u32 BE (4)] [bincode Handshake(N)]
//! ```
//! The frame is read with exact reads, so bytes the peer sends right after
//! its handshake stay in the socket for the read loop.
//!
//! ## Payloads
//! `Framing::Raw` yields whatever a single read produced, capped at the
//! configured chunk size. `Framing::LengthDelimited` prefixes every payload
//! with a 4-byte big-endian length.

use crate::error::{ProtocolError, Result};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};
use tracing::trace;

/// Magic bytes opening every handshake frame
pub const HANDSHAKE_MAGIC: [u8; 4] = *b"PKGG";

/// Magic + length
pub const HEADER_SIZE: usize = 8;

/// Upper bound on an encoded handshake body
pub const MAX_HANDSHAKE_SIZE: usize = 64 * 1024;

/// How application payloads are delimited after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// One message per successful read call.
    #[default]
    Raw,
    /// 4-byte big-endian length prefix per message.
    LengthDelimited,
}

/// Wrap an encoded handshake body in a frame.
pub fn encode_frame(body: &[u8]) -> Result<Vec<u8>> {
    if body.len() > MAX_HANDSHAKE_SIZE {
        return Err(ProtocolError::OversizedFrame(body.len()));
    }

    let mut frame = Vec::with_capacity(HEADER_SIZE + body.len());
    frame.extend_from_slice(&HANDSHAKE_MAGIC);
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(body);
    Ok(frame)
}

/// Validate a frame header and return the body length it announces.
pub fn parse_header(header: &[u8]) -> Result<usize> {
    if header.len() < HEADER_SIZE || header[0..4] != HANDSHAKE_MAGIC {
        return Err(ProtocolError::InvalidHeader);
    }

    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if len > MAX_HANDSHAKE_SIZE {
        return Err(ProtocolError::OversizedFrame(len));
    }
    Ok(len)
}

/// Read exactly one handshake frame body, consuming nothing past it.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await.map_err(eof_as_closed)?;

    let len = parse_header(&header)?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(eof_as_closed)?;

    trace!(bytes = len, "Handshake frame read");
    Ok(body)
}

fn eof_as_closed(err: std::io::Error) -> ProtocolError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        ProtocolError::ConnectionClosed
    } else {
        ProtocolError::ReadFailure(err)
    }
}

/// Decoder/encoder for post-handshake payloads.
#[derive(Debug)]
pub enum PayloadCodec {
    Raw { chunk_size: usize },
    LengthDelimited(LengthDelimitedCodec),
}

impl PayloadCodec {
    pub fn new(framing: Framing, chunk_size: usize, max_frame_size: usize) -> Self {
        match framing {
            Framing::Raw => PayloadCodec::Raw {
                chunk_size: chunk_size.max(1),
            },
            Framing::LengthDelimited => PayloadCodec::LengthDelimited(
                LengthDelimitedCodec::builder()
                    .length_field_length(4)
                    .max_frame_length(max_frame_size)
                    .new_codec(),
            ),
        }
    }

    pub fn framing(&self) -> Framing {
        match self {
            PayloadCodec::Raw { .. } => Framing::Raw,
            PayloadCodec::LengthDelimited(_) => Framing::LengthDelimited,
        }
    }
}

impl Decoder for PayloadCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        match self {
            PayloadCodec::Raw { chunk_size } => {
                if src.is_empty() {
                    return Ok(None);
                }
                let n = src.len().min(*chunk_size);
                Ok(Some(src.split_to(n).freeze()))
            }
            PayloadCodec::LengthDelimited(codec) => codec
                .decode(src)
                .map(|frame| frame.map(BytesMut::freeze))
                .map_err(ProtocolError::ReadFailure),
        }
    }
}

impl Encoder<Bytes> for PayloadCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        match self {
            PayloadCodec::Raw { .. } => {
                dst.extend_from_slice(&item);
                Ok(())
            }
            PayloadCodec::LengthDelimited(codec) => {
                let len = item.len();
                codec.encode(item, dst).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::InvalidInput {
                        ProtocolError::OversizedFrame(len)
                    } else {
                        ProtocolError::Io(e)
                    }
                })
            }
        }
    }
}
