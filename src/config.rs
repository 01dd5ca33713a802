//! Runtime configuration from environment variables

use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    /// Unset means the in-memory store.
    pub database_url: Option<String>,
    pub port: u16,
    pub max_connections: u32,
    pub lock_timeout: Duration,
    pub discount_sweep_interval: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            port: parse_or(&lookup, "PORT", 8083)?,
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            lock_timeout: Duration::from_millis(parse_or(&lookup, "LOCK_TIMEOUT_MS", 5_000)?),
            discount_sweep_interval: Duration::from_secs(parse_or(&lookup, "DISCOUNT_SWEEP_SECS", 300)?),
        })
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { key, value }),
    }
}
