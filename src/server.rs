//! Top-level server composition.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::handlers::Registry;
use crate::network::Listener;
use crate::state::{MessageStore, StateManager};

/// The assembled server: configuration, shared state, and listeners.
pub struct Server {
    state: Arc<StateManager>,
    listener: Listener,
    cancel: CancellationToken,
}

impl Server {
    /// Validate the configuration and bind the listening sockets.
    ///
    /// Binding happens here rather than in [`run`](Self::run) so callers
    /// (tests in particular) can bind port 0 and read the real address
    /// before starting the accept loops.
    pub async fn bind(config: Config) -> anyhow::Result<Server> {
        config.validate()?;

        let state = Arc::new(StateManager::new(
            &config.server_name,
            config.max_messages_per_target,
        ));
        let registry = Arc::new(Registry::new());
        let cancel = CancellationToken::new();
        let listener = Listener::bind(&config, Arc::clone(&state), registry, cancel.clone()).await?;

        info!(server = %config.server_name, "gossipd starting");
        Ok(Server {
            state,
            listener,
            cancel,
        })
    }

    /// Address of the plaintext listener.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Address of the TLS listener, when configured.
    pub fn tls_local_addr(&self) -> Option<SocketAddr> {
        self.listener.tls_local_addr()
    }

    /// The shared state, exposed for integration tests.
    pub fn state(&self) -> Arc<StateManager> {
        Arc::clone(&self.state)
    }

    /// A token that stops the accept loops when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until shut down: starts the background sweeps and drives the
    /// accept loops.
    pub async fn run(self) -> anyhow::Result<()> {
        MessageStore::spawn_sweeper(Arc::clone(&self.state.messages));
        StateManager::spawn_reaper(Arc::clone(&self.state));
        self.listener.run().await
    }
}
