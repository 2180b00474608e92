//! # Service Layer
//!
//! The game server: peer registry, coordination loop and the handle used to
//! drive a running server.

pub mod server;

pub use server::{PeerInfo, Server, ServerHandle};
