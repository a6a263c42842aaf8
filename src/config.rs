//! Command-line and environment configuration.

use crate::host::{HostSource, MemoryHost};
use crate::module::DEFAULT_NAMESPACE;
use clap::Parser;
use std::time::Duration;

/// Pattern-based bulk delete and bulk set for Redis-compatible servers.
///
/// Without `--upstream` the commands run against an embedded in-memory host.
#[derive(Debug, Clone, Parser)]
#[command(name = "kbulk", version, about, long_about = None)]
pub struct Config {
    /// Host to bind to
    #[arg(short = 'H', long, env = "KBULK_HOST", default_value = crate::DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "KBULK_PORT", default_value_t = crate::DEFAULT_PORT)]
    pub port: u16,

    /// Upstream RESP server (`host:port`) that owns the data
    #[arg(short, long, env = "KBULK_UPSTREAM")]
    pub upstream: Option<String>,

    /// Prefix of the module command names (`<namespace>.del`, ...)
    #[arg(short, long, env = "KBULK_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Upstream connect and round-trip timeout in milliseconds
    #[arg(long, env = "KBULK_TIMEOUT_MS", default_value_t = 5000)]
    pub timeout_ms: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Run `<namespace>.test` once against the host and exit
    #[arg(long)]
    pub self_test: bool,
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Where client connections get their host from.
    pub fn host_source(&self) -> HostSource {
        match &self.upstream {
            Some(addr) => HostSource::Remote {
                addr: addr.clone(),
                timeout: self.timeout(),
            },
            None => HostSource::Memory(MemoryHost::new()),
        }
    }
}
