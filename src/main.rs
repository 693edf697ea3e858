use clap::Parser;
use gossipd::{Config, Server};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.verbosity.directive())),
        )
        .with_target(true)
        .init();

    let server = Server::bind(config).await.map_err(|e| {
        error!(error = %e, "failed to start");
        e
    })?;

    server.run().await
}
