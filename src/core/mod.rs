//! # Core Protocol Components
//!
//! Low-level framing shared by the handshake and the peer read loops.
//!
//! ## Wire Format
//! ```text
//! Handshake: [Magic(4)] [Length(4)] [Body(N)]
//! Payloads:  raw read chunks, or [Length(4)] [Payload(N)]
//! ```
//!
//! ## Safety limits
//! - Handshake bodies are capped at 64 KiB
//! - Length-delimited payloads are capped by `max_frame_size`
//! - Lengths are validated before allocation

pub mod codec;
