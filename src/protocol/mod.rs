//! # Protocol Layer
//!
//! What peers say to each other once a TCP connection exists.
//!
//! ## Components
//! - **Game**: variant and status values carried in the handshake
//! - **Handshake**: the one-time compatibility exchange
//! - **Message**: inbound payload envelope
//! - **Handler**: pluggable per-message strategy
//!
//! ## Handshake order
//! The dialing side sends first. The accepting side validates it (variant,
//! then exact version string) and only then replies with its own.

pub mod game;
pub mod handler;
pub mod handshake;
pub mod message;

#[cfg(test)]
mod tests;
