//! TLS acceptor construction from PEM files.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio_rustls::TlsAcceptor;
use tracing::info;

/// Load a PEM certificate chain and private key into a TLS acceptor.
pub fn load_acceptor(cert_path: &Path, key_path: &Path) -> anyhow::Result<TlsAcceptor> {
    let cert_pem = std::fs::read(cert_path)
        .with_context(|| format!("reading TLS certificate {}", cert_path.display()))?;
    let key_pem = std::fs::read(key_path)
        .with_context(|| format!("reading TLS key {}", key_path.display()))?;

    let certs: Vec<_> = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<_, _>>()
        .context("parsing TLS certificate")?;
    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .context("parsing TLS key")?
        .with_context(|| format!("no private key found in {}", key_path.display()))?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("building TLS server config")?;

    info!(cert = %cert_path.display(), "TLS certificate loaded");
    Ok(TlsAcceptor::from(Arc::new(config)))
}
