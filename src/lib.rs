//! gossipd - the Gossip IRC server.
//!
//! An RFC 1459 client-protocol server: many concurrent TCP/TLS clients,
//! a shared in-memory state model (users, channels, recent messages),
//! and per-connection sessions bridging the two.

pub mod config;
pub mod error;
pub mod handlers;
pub mod network;
pub mod server;
pub mod state;

pub use config::{Config, Verbosity};
pub use server::Server;
