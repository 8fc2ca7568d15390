use axum::http::StatusCode;
use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct StubConfig {
    pub bind_address: SocketAddr,
    /// When set, every webhook request is answered with this status.
    pub fail_status: Option<StatusCode>,
    pub log_level: Level,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 5678)),
            fail_status: None,
            log_level: Level::INFO,
        }
    }
}

impl StubConfig {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("STUB_BIND_ADDRESS").unwrap_or_else(|_| "127.0.0.1:5678".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("STUB_BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let fail_status = match std::env::var("STUB_FAIL_STATUS") {
            Ok(raw) => Some(parse_status(&raw)?),
            Err(_) => None,
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            fail_status,
            log_level,
        })
    }
}

/// Only error statuses make sense as a forced failure.
fn parse_status(raw: &str) -> Result<StatusCode, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue("STUB_FAIL_STATUS".to_string(), reason);
    let code = raw
        .trim()
        .parse::<u16>()
        .map_err(|e| invalid(e.to_string()))?;
    let status = StatusCode::from_u16(code).map_err(|e| invalid(e.to_string()))?;
    if status.is_client_error() || status.is_server_error() {
        Ok(status)
    } else {
        Err(invalid(format!("{code} is not an error status")))
    }
}
