//! # Transport Layer
//!
//! TCP connections and the listener that produces them.
//!
//! ## Components
//! - **Peer**: one live connection, its direction flag and its read loop
//! - **TcpTransport**: the listening socket and accept loop
//!
//! ## Concurrency
//! Each peer's read loop runs on its own task. The transport only publishes
//! peers and messages on channels; registry mutation happens elsewhere.

pub mod peer;
pub mod tcp;

pub use peer::{Peer, PeerHandle, PeerOptions, ReadLoopExit};
pub use tcp::TcpTransport;
