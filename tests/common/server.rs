//! Test server management.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use gossipd::config::Config;
use gossipd::state::StateManager;
use gossipd::Server;
use tokio_util::sync::CancellationToken;

use super::client::TestClient;

/// An in-process gossipd bound to an ephemeral port.
pub struct TestServer {
    addr: SocketAddr,
    state: Arc<StateManager>,
    shutdown: CancellationToken,
}

impl TestServer {
    /// Bind on port 0 and start the accept loops in the background.
    pub async fn spawn() -> anyhow::Result<TestServer> {
        let config = Config::try_parse_from(["gossipd", "--host", "127.0.0.1", "--port", "0"])?;
        let server = Server::bind(config).await?;
        let addr = server.local_addr()?;
        let state = server.state();
        let shutdown = server.shutdown_token();
        tokio::spawn(server.run());

        Ok(TestServer {
            addr,
            state,
            shutdown,
        })
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Shared state, for white-box assertions.
    #[allow(dead_code)]
    pub fn state(&self) -> Arc<StateManager> {
        Arc::clone(&self.state)
    }

    /// Connect a new test client.
    pub async fn connect(&self, nick: &str) -> anyhow::Result<TestClient> {
        TestClient::connect(&self.address(), nick).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
