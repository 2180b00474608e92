use bytes::{Buf, Bytes};
use std::io::Read;
use std::net::SocketAddr;

/// One inbound application payload and the peer it came from.
///
/// Produced once per read by a peer's read loop and consumed exactly once by
/// the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub payload: Bytes,
    pub from: SocketAddr,
}

impl Message {
    pub fn new(payload: impl Into<Bytes>, from: SocketAddr) -> Self {
        Self {
            payload: payload.into(),
            from,
        }
    }

    /// Lazy reader over the payload.
    pub fn payload_reader(&self) -> impl Read {
        self.payload.clone().reader()
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_payload_reader_drains_everything() {
        let from: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let msg = Message::new(&b"raise 200"[..], from);

        let mut out = String::new();
        msg.payload_reader().read_to_string(&mut out).unwrap();

        assert_eq!(out, "raise 200");
        assert_eq!(msg.len(), 9);
        assert_eq!(msg.from, from);
    }
}
