//! Integration test infrastructure: an in-process server plus a raw IRC
//! test client for asserting on message flows.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::TestServer;
