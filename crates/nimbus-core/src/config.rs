use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// Environment prefix for overrides, e.g. `NIMBUS_REDIS__URL`.
pub const ENV_PREFIX: &str = "NIMBUS";

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_VAR: &str = "NIMBUS_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "nimbus.toml";

/// TTLs above this are allowed but almost certainly a typo.
const MAX_SANE_TTL_SECS: u64 = 24 * 60 * 60;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// All errors joined into one line, for logs and startup failures.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub redis: RedisConfig,
    pub cache: CacheConfig,
    pub weather_api: WeatherApiConfig,

    /// Default tracing filter; `RUST_LOG` takes precedence when set.
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,

    /// Maximum pooled connections
    pub pool_size: usize,

    /// How many times startup pings the database before giving up
    pub connect_attempts: u32,

    /// Pause between startup pings
    pub connect_backoff_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            dbname: "weather".to_string(),
            pool_size: 16,
            connect_attempts: 10,
            connect_backoff_ms: 2000,
        }
    }
}

impl PostgresConfig {
    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,

    /// Upper bound on every single cache command
    pub op_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            op_timeout_ms: 2000,
        }
    }
}

impl RedisConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

/// Cache key namespace and per-cache-type entry lifetimes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub key_prefix: String,
    pub city_ttl_secs: u64,
    pub cities_all_ttl_secs: u64,
    pub weather_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: "nimbus".to_string(),
            city_ttl_secs: 300,
            cities_all_ttl_secs: 300,
            weather_ttl_secs: 60,
        }
    }
}

impl CacheConfig {
    pub fn city_ttl(&self) -> Duration {
        Duration::from_secs(self.city_ttl_secs)
    }

    pub fn cities_all_ttl(&self) -> Duration {
        Duration::from_secs(self.cities_all_ttl_secs)
    }

    pub fn weather_ttl(&self) -> Duration {
        Duration::from_secs(self.weather_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherApiConfig {
    /// Base URL of the Open-Meteo compatible provider
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for WeatherApiConfig {
    fn default() -> Self {
        Self {
            url: "https://api.open-meteo.com".to_string(),
            timeout_secs: 10,
        }
    }
}

impl WeatherApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl Config {
    /// Load from `$NIMBUS_CONFIG` (or `./nimbus.toml`), then apply
    /// `NIMBUS_*` environment overrides. A missing file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&path, ENV_PREFIX)
    }

    /// Load from an explicit file and environment prefix.
    ///
    /// Nested keys use a double underscore: `{prefix}_CACHE__WEATHER_TTL_SECS`.
    pub fn load_from(path: &Path, env_prefix: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Load configuration and validate it
    ///
    /// Warnings are logged; any error aborts.
    pub fn load_validated() -> Result<Self, ConfigError> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()));
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok(config)
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.server.port == 0 {
            result.add_error("server.port", "Port cannot be 0");
        }

        if self.postgres.host.trim().is_empty() {
            result.add_error("postgres.host", "Host is required");
        }
        if self.postgres.port == 0 {
            result.add_error("postgres.port", "Port cannot be 0");
        }
        if self.postgres.dbname.trim().is_empty() {
            result.add_error("postgres.dbname", "Database name is required");
        }
        if self.postgres.pool_size == 0 {
            result.add_error("postgres.pool_size", "Pool size must be greater than 0");
        }
        if self.postgres.connect_attempts == 0 {
            result.add_warning(
                "postgres.connect_attempts",
                "Startup will not wait for the database",
            );
        }

        validate_url(&self.redis.url, "redis.url", &["redis", "rediss"], &mut result);
        if self.redis.op_timeout_ms == 0 {
            result.add_error("redis.op_timeout_ms", "Timeout must be greater than 0");
        }

        if self.cache.key_prefix.contains(char::is_whitespace) {
            result.add_error("cache.key_prefix", "Key prefix cannot contain whitespace");
        }
        for (field, secs) in [
            ("cache.city_ttl_secs", self.cache.city_ttl_secs),
            ("cache.cities_all_ttl_secs", self.cache.cities_all_ttl_secs),
            ("cache.weather_ttl_secs", self.cache.weather_ttl_secs),
        ] {
            if secs == 0 {
                result.add_error(field, "TTL must be greater than 0");
            } else if secs > MAX_SANE_TTL_SECS {
                result.add_warning(field, "TTL is more than 24 hours");
            }
        }

        validate_url(
            &self.weather_api.url,
            "weather_api.url",
            &["http", "https"],
            &mut result,
        );
        if self.weather_api.timeout_secs == 0 {
            result.add_error("weather_api.timeout_secs", "Timeout must be greater than 0");
        }

        result
    }
}

fn validate_url(url_str: &str, field_name: &str, schemes: &[&str], result: &mut ValidationResult) {
    match Url::parse(url_str) {
        Ok(url) => {
            if !schemes.contains(&url.scheme()) {
                result.add_error(
                    field_name,
                    format!(
                        "URL must use {} scheme, got: {}",
                        schemes.join(" or "),
                        url.scheme()
                    ),
                );
            }

            if url.host().is_none() {
                result.add_error(field_name, "URL must have a host");
            }

            if url.port() == Some(0) {
                result.add_error(field_name, "Port cannot be 0");
            }
        }
        Err(e) => {
            result.add_error(field_name, format!("Invalid URL: {}", e));
        }
    }
}
