use leadchat_core::config::ChatConfig;
use leadchat_core::recorder::DEFAULT_MAX_RECORDING_SECS;
use leadchat_core::webhook::AudioTransport;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Absent means replies are simulated locally.
    pub webhook_url: Option<String>,
    pub audio_transport: AudioTransport,
    pub max_recording_secs: u32,
    pub history_window: usize,
    pub surface_errors: bool,
    pub greetings: Vec<String>,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let webhook_url = std::env::var("WEBHOOK_URL")
            .ok()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        let audio_transport = match std::env::var("AUDIO_TRANSPORT") {
            Ok(raw) => raw
                .parse::<AudioTransport>()
                .map_err(|e| ConfigError::InvalidValue("AUDIO_TRANSPORT".to_string(), e.to_string()))?,
            Err(_) => AudioTransport::default(),
        };

        let max_recording_secs = parse_var("MAX_RECORDING_SECS", DEFAULT_MAX_RECORDING_SECS)?;
        if max_recording_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_RECORDING_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let history_window = parse_var("HISTORY_WINDOW", ChatConfig::default().history_window)?;

        let surface_errors = match std::env::var("SURFACE_ERRORS") {
            Ok(raw) => parse_bool(&raw).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "SURFACE_ERRORS".to_string(),
                    format!("'{}' is not a boolean", raw),
                )
            })?,
            Err(_) => false,
        };

        let greetings = std::env::var("CHAT_GREETINGS")
            .map(|raw| {
                raw.split('|')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            webhook_url,
            audio_transport,
            max_recording_secs,
            history_window,
            surface_errors,
            greetings,
            log_level,
        })
    }

    /// Session tunables derived from this configuration.
    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig {
            max_recording_secs: self.max_recording_secs,
            history_window: self.history_window,
            surface_errors: self.surface_errors,
            greetings: self.greetings.clone(),
            ..ChatConfig::default()
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
