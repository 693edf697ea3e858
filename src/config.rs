//! Server configuration, taken entirely from the command line.

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};

/// The gossip IRC server.
#[derive(Debug, Clone, Parser)]
#[command(name = "gossipd", version, about)]
pub struct Config {
    /// Address to listen on.
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Plaintext TCP port.
    #[arg(long, default_value_t = 6667)]
    pub port: u16,

    /// TLS port, used when --use-ssl is set.
    #[arg(long, default_value_t = 6697)]
    pub ssl_port: u16,

    /// PEM-encoded certificate chain for TLS.
    #[arg(long)]
    pub ssl_cert: Option<PathBuf>,

    /// PEM-encoded private key for TLS.
    #[arg(long)]
    pub ssl_key: Option<PathBuf>,

    /// Also listen for TLS connections on --ssl-port.
    #[arg(
        long,
        num_args = 0..=1,
        default_missing_value = "true",
        default_value_t = false,
        action = clap::ArgAction::Set
    )]
    pub use_ssl: bool,

    /// Log verbosity.
    #[arg(long, value_enum, default_value_t = Verbosity::Info)]
    pub verbosity: Verbosity,

    /// Server identity used as the prefix of numeric replies.
    #[arg(long, default_value = "irc.gossip.local")]
    pub server_name: String,

    /// Maximum concurrent client connections.
    #[arg(long, default_value_t = 1000)]
    pub max_connections: usize,

    /// Recent messages kept per channel or nickname.
    #[arg(long, default_value_t = 1000)]
    pub max_messages_per_target: usize,
}

/// Log verbosity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Verbosity {
    Info,
    Debug,
    Trace,
}

impl Verbosity {
    /// The default tracing filter directive for this level.
    pub fn directive(self) -> &'static str {
        match self {
            Verbosity::Info => "info",
            Verbosity::Debug => "debug",
            Verbosity::Trace => "trace",
        }
    }
}

impl Config {
    /// Check cross-flag consistency.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.use_ssl && (self.ssl_cert.is_none() || self.ssl_key.is_none()) {
            anyhow::bail!("--use-ssl requires both --ssl-cert and --ssl-key");
        }
        Ok(())
    }

    /// The certificate/key pair; only valid after `validate` passed with
    /// `use_ssl` set.
    pub fn tls_paths(&self) -> anyhow::Result<(&Path, &Path)> {
        match (&self.ssl_cert, &self.ssl_key) {
            (Some(cert), Some(key)) => Ok((cert, key)),
            _ => anyhow::bail!("TLS requested without --ssl-cert/--ssl-key"),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ssl_bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.ssl_port)
    }
}
