use std::env;
use std::str::FromStr;

/// Default ceiling on an uploaded calendar file.
pub const DEFAULT_IMPORT_MAX_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub import_max_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            port: parse_value("PORT", env::var("PORT").ok(), 5280, "a valid port number")?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:data/shiftcal.db?mode=rwc".to_string()),
            import_max_bytes: parse_value(
                "IMPORT_MAX_BYTES",
                env::var("IMPORT_MAX_BYTES").ok(),
                DEFAULT_IMPORT_MAX_BYTES,
                "a byte count",
            )?,
        })
    }
}

fn parse_value<T: FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value,
        }),
    }
}
