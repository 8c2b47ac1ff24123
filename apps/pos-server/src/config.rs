//! Server configuration.
//!
//! ```text
//! defaults ──► tavola.toml (optional) ──► TAVOLA_* environment ──► validate
//! ```
//!
//! Example file:
//! ```toml
//! bind_address = "0.0.0.0:8080"
//! database_path = "/var/lib/tavola/tavola.db"
//! cents_per_loyalty_point = 100
//!
//! [gateway]
//! redirect_url = "https://pay.example.com/checkout"
//! success_url = "https://pos.example.com/paid"
//! failure_url = "https://pos.example.com/failed"
//! merchant_code = "TAVOLA-01"
//!
//! [retry]
//! max_elapsed_ms = 3000
//! ```

use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tavola_core::DEFAULT_CENTS_PER_LOYALTY_POINT;
use tavola_db::{DbConfig, EngineSettings, GatewaySettings, RetryPolicy};

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "TAVOLA_";

/// POS server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket the HTTP server listens on
    pub bind_address: String,

    /// SQLite database file
    pub database_path: PathBuf,

    /// Pool size
    pub max_connections: u32,

    /// Settled cents per loyalty point
    pub cents_per_loyalty_point: i64,

    pub gateway: GatewayConfig,

    pub retry: RetryConfig,
}

/// Redirect configuration handed to the front end for gateway checkouts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub redirect_url: String,
    pub success_url: String,
    pub failure_url: String,
    pub merchant_code: String,
}

/// Backoff for transient write conflicts, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub max_elapsed_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: "127.0.0.1:8080".to_string(),
            database_path: PathBuf::from("tavola.db"),
            max_connections: 5,
            cents_per_loyalty_point: DEFAULT_CENTS_PER_LOYALTY_POINT,
            gateway: GatewayConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        RetryConfig {
            initial_interval_ms: policy.initial_interval.as_millis() as u64,
            max_interval_ms: policy.max_interval.as_millis() as u64,
            max_elapsed_ms: policy.max_elapsed.as_millis() as u64,
        }
    }
}

impl ServerConfig {
    /// Loads defaults, then `path` if given, then `TAVOLA_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => ServerConfig::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Overlays variables named `TAVOLA_<FIELD>`, e.g. `TAVOLA_BIND_ADDRESS`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = var("BIND_ADDRESS") {
            self.bind_address = v;
        }
        if let Some(v) = var("DATABASE_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = var("MAX_CONNECTIONS") {
            self.max_connections = parse("MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = var("CENTS_PER_LOYALTY_POINT") {
            self.cents_per_loyalty_point = parse("CENTS_PER_LOYALTY_POINT", &v)?;
        }
        if let Some(v) = var("GATEWAY_REDIRECT_URL") {
            self.gateway.redirect_url = v;
        }
        if let Some(v) = var("GATEWAY_SUCCESS_URL") {
            self.gateway.success_url = v;
        }
        if let Some(v) = var("GATEWAY_FAILURE_URL") {
            self.gateway.failure_url = v;
        }
        if let Some(v) = var("GATEWAY_MERCHANT_CODE") {
            self.gateway.merchant_code = v;
        }
        if let Some(v) = var("RETRY_MAX_ELAPSED_MS") {
            self.retry.max_elapsed_ms = parse("RETRY_MAX_ELAPSED_MS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("max_connections".to_string()));
        }
        if self.cents_per_loyalty_point <= 0 {
            return Err(ConfigError::InvalidValue("cents_per_loyalty_point".to_string()));
        }
        if self.retry.initial_interval_ms == 0
            || self.retry.initial_interval_ms > self.retry.max_interval_ms
        {
            return Err(ConfigError::InvalidValue("retry".to_string()));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidValue("bind_address".to_string()))
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database_path)
            .max_connections(self.max_connections)
            .retry(self.retry_policy())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_interval: Duration::from_millis(self.retry.initial_interval_ms),
            max_interval: Duration::from_millis(self.retry.max_interval_ms),
            max_elapsed: Duration::from_millis(self.retry.max_elapsed_ms),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            cents_per_loyalty_point: self.cents_per_loyalty_point,
            gateway: GatewaySettings {
                redirect_url: self.gateway.redirect_url.clone(),
                success_url: self.gateway.success_url.clone(),
                failure_url: self.gateway.failure_url.clone(),
                merchant_code: self.gateway.merchant_code.clone(),
            },
        }
    }
}

fn parse<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("{ENV_PREFIX}{name}")))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Invalid configuration file: {0}")]
    Parse(String),

    #[error("Invalid value for {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cents_per_loyalty_point, 100);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ServerConfig::from_toml(
            r#"
            database_path = "/tmp/tavola-test.db"

            [gateway]
            merchant_code = "M-42"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/tavola-test.db"));
        assert_eq!(config.gateway.merchant_code, "M-42");
        assert_eq!(config.bind_address, "127.0.0.1:8080");
        assert_eq!(config.engine_settings().gateway.merchant_code, "M-42");
    }

    #[test]
    fn test_environment_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TAVOLA_BIND_ADDRESS", "0.0.0.0:9000"),
            ("TAVOLA_CENTS_PER_LOYALTY_POINT", "500"),
            ("TAVOLA_GATEWAY_REDIRECT_URL", "https://pay.example.com"),
        ]
        .into_iter()
        .collect();

        let mut config = ServerConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.socket_addr().unwrap().port(), 9000);
        assert_eq!(config.cents_per_loyalty_point, 500);
        assert_eq!(config.gateway.redirect_url, "https://pay.example.com");
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = ServerConfig::default();
        let err = config
            .apply_overrides(|key| (key == "TAVOLA_MAX_CONNECTIONS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));

        let config = ServerConfig {
            cents_per_loyalty_point: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            bind_address: "not an address".to_string(),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());

        assert!(matches!(
            ServerConfig::from_toml("max_connections = \"ten\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
