//! Configuration parsing and validation for the relay server
//!
//! This module handles command-line argument parsing and validation using clap.
//! Every option can also be supplied through a `RELAY_*` environment variable.
use anyhow::anyhow;
use clap::Parser;
use registration_relay::client::PoolConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// The port on which the relay will listen.
    #[arg(short = 'p', long, env = "RELAY_PORT", default_value_t = 3000)]
    pub port: u16,

    /// The port on which the metrics server will listen.
    #[arg(long, env = "RELAY_METRICS_PORT", default_value_t = 9090)]
    pub metrics_port: u16,

    /// Whether to enable the metrics endpoint.
    #[arg(short = 'm', long, env = "RELAY_METRICS", default_value_t = true, action = clap::ArgAction::Set)]
    pub metrics: bool,

    /// The JSON file from which to read the upstreams.
    #[arg(short = 'f', long, env = "RELAY_UPSTREAMS")]
    pub upstreams: PathBuf,

    /// Whether we should continue watching the upstreams file for changes
    #[arg(short = 'w', long, env = "RELAY_WATCH", default_value_t = true, action = clap::ArgAction::Set)]
    pub watch: bool,

    /// The prefix to use for metrics.
    #[arg(long, env = "RELAY_METRICS_PREFIX", default_value = "relay")]
    pub metrics_prefix: String,

    /// Maximum number of idle HTTP connections to keep alive per upstream host.
    #[arg(long, env = "RELAY_POOL_MAX_IDLE_PER_HOST", default_value_t = 100)]
    pub pool_max_idle_per_host: usize,

    /// How long (in seconds) to keep idle HTTP connections alive.
    #[arg(long, env = "RELAY_POOL_IDLE_TIMEOUT_SECS", default_value_t = 90)]
    pub pool_idle_timeout_secs: u64,
}

impl Config {
    pub fn validate(self) -> Result<Self, anyhow::Error> {
        if !self.upstreams.exists() {
            return Err(anyhow!(
                "Upstreams file '{}' does not exist",
                self.upstreams.display()
            ));
        }
        Ok(self)
    }

    pub fn pool(&self) -> PoolConfig {
        PoolConfig {
            idle_timeout: Duration::from_secs(self.pool_idle_timeout_secs),
            max_idle_per_host: self.pool_max_idle_per_host,
        }
    }
}
