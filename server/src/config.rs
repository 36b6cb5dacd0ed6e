//! Server configuration from the environment

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Postgres connection string; the in-memory store is used when absent.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub host: IpAddr,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    /// `None` disables the background status sweep.
    pub sweep_interval: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 5,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3000,
            cors_allowed_origins: Vec::new(),
            sweep_interval: Some(Duration::from_secs(3600)),
        }
    }
}

fn parse<T: std::str::FromStr>(
    name: &'static str,
    expected: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value,
        }),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        let database_max_connections = parse(
            "DATABASE_MAX_CONNECTIONS",
            "a positive integer",
            lookup("DATABASE_MAX_CONNECTIONS"),
            defaults.database_max_connections,
        )?;
        let host = parse("HOST", "an IP address", lookup("HOST"), defaults.host)?;
        let port = parse("PORT", "a port number", lookup("PORT"), defaults.port)?;
        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let sweep_secs: u64 = parse(
            "STATUS_SWEEP_INTERVAL_SECS",
            "a number of seconds",
            lookup("STATUS_SWEEP_INTERVAL_SECS"),
            3600,
        )?;

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            cors_allowed_origins,
            sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
