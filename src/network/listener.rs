//! TCP (and optional TLS) accept loops.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context as _;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::config::Config;
use crate::handlers::Registry;
use crate::network::session::Session;
use crate::network::tls;
use crate::state::StateManager;

/// Bounds the TLS handshake so a silent peer cannot pin an accept slot.
const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Accepts connections and spawns a [`Session`] per client, enforcing a
/// global concurrent-connection cap.
pub struct Listener {
    tcp: TcpListener,
    tls: Option<(TcpListener, TlsAcceptor)>,
    state: Arc<StateManager>,
    registry: Arc<Registry>,
    cancel: CancellationToken,
    max_connections: usize,
    active: Arc<AtomicUsize>,
}

impl Listener {
    /// Bind the configured sockets.
    pub async fn bind(
        config: &Config,
        state: Arc<StateManager>,
        registry: Arc<Registry>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self> {
        let tcp = TcpListener::bind(config.bind_addr())
            .await
            .with_context(|| format!("binding {}", config.bind_addr()))?;
        info!(addr = %tcp.local_addr()?, "listening (plaintext)");

        let tls = if config.use_ssl {
            let (cert, key) = config.tls_paths()?;
            let acceptor = tls::load_acceptor(cert, key)?;
            let listener = TcpListener::bind(config.ssl_bind_addr())
                .await
                .with_context(|| format!("binding {}", config.ssl_bind_addr()))?;
            info!(addr = %listener.local_addr()?, "listening (TLS)");
            Some((listener, acceptor))
        } else {
            None
        };

        Ok(Self {
            tcp,
            tls,
            state,
            registry,
            cancel,
            max_connections: config.max_connections,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address of the plaintext listener.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    /// Address of the TLS listener, when configured.
    pub fn tls_local_addr(&self) -> Option<SocketAddr> {
        self.tls
            .as_ref()
            .and_then(|(listener, _)| listener.local_addr().ok())
    }

    /// Run the accept loops until cancelled, then wait for the sessions
    /// still running to finish on their own.
    pub async fn run(self) -> anyhow::Result<()> {
        let tracker = TaskTracker::new();

        let plain = accept_loop(AcceptLoop {
            listener: self.tcp,
            tls: None,
            state: Arc::clone(&self.state),
            registry: Arc::clone(&self.registry),
            cancel: self.cancel.clone(),
            tracker: tracker.clone(),
            active: Arc::clone(&self.active),
            max_connections: self.max_connections,
        });

        if let Some((listener, acceptor)) = self.tls {
            let secure = accept_loop(AcceptLoop {
                listener,
                tls: Some(acceptor),
                state: self.state,
                registry: self.registry,
                cancel: self.cancel.clone(),
                tracker: tracker.clone(),
                active: self.active,
                max_connections: self.max_connections,
            });
            tokio::join!(plain, secure);
        } else {
            plain.await;
        }

        // Stopped accepting; running sessions terminate on their own and
        // the listener is not stopped until they have.
        tracker.close();
        tracker.wait().await;
        info!("listener stopped");
        Ok(())
    }
}

struct AcceptLoop {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    state: Arc<StateManager>,
    registry: Arc<Registry>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    active: Arc<AtomicUsize>,
    max_connections: usize,
}

async fn accept_loop(ctx: AcceptLoop) {
    let AcceptLoop {
        listener,
        tls,
        state,
        registry,
        cancel,
        tracker,
        active,
        max_connections,
    } = ctx;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            result = listener.accept() => {
                let (stream, addr) = match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        // Transient accept failures (EMFILE and friends):
                        // log, back off briefly, keep accepting.
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        continue;
                    }
                };

                if active.load(Ordering::Acquire) >= max_connections {
                    warn!(%addr, cap = max_connections, "connection cap reached, closing");
                    drop(stream);
                    continue;
                }
                active.fetch_add(1, Ordering::AcqRel);

                let state = Arc::clone(&state);
                let registry = Arc::clone(&registry);
                let active = Arc::clone(&active);
                let tls = tls.clone();

                // Sessions get their own token: stopping the listener
                // does not interrupt clients already connected.
                let session = Session::new(state, registry, addr, CancellationToken::new());

                tracker.spawn(async move {
                    match tls {
                        Some(acceptor) => {
                            match tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                                Ok(Ok(tls_stream)) => session.run(tls_stream).await,
                                Ok(Err(e)) => warn!(%addr, error = %e, "TLS handshake failed"),
                                Err(_) => warn!(%addr, "TLS handshake timed out"),
                            }
                        }
                        None => session.run(stream).await,
                    }
                    active.fetch_sub(1, Ordering::AcqRel);
                });
            }
        }
    }
}
