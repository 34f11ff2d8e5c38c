pub mod config;
pub mod error;

pub use config::{
    CacheConfig, Config, LogLevel, PostgresConfig, RedisConfig, ServerConfig, ValidationResult,
    WeatherApiConfig,
};
pub use error::{ConfigError, StartupError};

use anyhow::Result;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` is used.
pub fn init_logging(level: LogLevel) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_str())),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    tracing::info!("Nimbus logging initialized at {}", level.as_str());
    Ok(())
}
