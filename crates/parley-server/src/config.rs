use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use parley_api::ServiceConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Process configuration, read from `PARLEY_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub bridge_url: String,
    pub bridge_timeout: Duration,
    pub max_wait: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any name -> value source; unset names take their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.into());

        let port = parse_number::<u16>("PARLEY_PORT", var("PARLEY_PORT", "8000"), "port number")?;
        let bridge_timeout_ms = parse_number::<u64>(
            "PARLEY_BRIDGE_TIMEOUT_MS",
            var("PARLEY_BRIDGE_TIMEOUT_MS", "10000"),
            "number of milliseconds",
        )?;
        let max_wait_ms = parse_number::<u64>(
            "PARLEY_MAX_WAIT_MS",
            var("PARLEY_MAX_WAIT_MS", "120000"),
            "number of milliseconds",
        )?;

        Ok(Self {
            db_path: var("PARLEY_DB_PATH", "parley.db").into(),
            host: var("PARLEY_HOST", "0.0.0.0"),
            port,
            bridge_url: var("PARLEY_BRIDGE_URL", "http://localhost:9000/generate"),
            bridge_timeout: Duration::from_millis(bridge_timeout_ms),
            max_wait: Duration::from_millis(max_wait_ms),
        })
    }

    pub fn service_config(&self) -> ServiceConfig {
        let defaults = ServiceConfig::default();
        ServiceConfig {
            default_wait: defaults.default_wait.min(self.max_wait),
            max_wait: self.max_wait,
            // Slightly above the HTTP client's own timeout so that one fires first.
            bridge_timeout: self.bridge_timeout + Duration::from_secs(1),
            ..defaults
        }
    }
}

fn parse_number<T: std::str::FromStr>(
    name: &'static str,
    value: String,
    expected: &'static str,
) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value,
        })
}
