//! Process-level error types.
//!
//! Request-path errors live next to the stores that produce them
//! (`nimbus_services`, `nimbus_weather`); this module only covers what can
//! go wrong before the server is accepting requests.

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Load(_) => "Configuration file is malformed. Check your settings.",
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
        }
    }
}

/// Errors raised while wiring the process together.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Database unavailable: {0}")]
    Database(String),

    #[error("Cache store unavailable: {0}")]
    Cache(String),

    #[error("Metrics registration failed: {0}")]
    Metrics(String),

    #[error("Failed to bind server: {0}")]
    Bind(String),
}
