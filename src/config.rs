//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;

use crate::domain::CurrencySet;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Currencies accepted by SetCurrency, CreateExpense and Settle
    pub supported_currencies: CurrencySet,

    /// Apply migrations/ on start-up
    pub run_migrations: bool,

    /// Attempts per write batch on serialization conflicts
    pub store_max_retries: u32,

    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let supported_currencies = match env::var("SUPPORTED_CURRENCIES") {
            Ok(csv) => parse_currencies(&csv)?,
            Err(_) => CurrencySet::default(),
        };

        let run_migrations = env::var("RUN_MIGRATIONS")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("RUN_MIGRATIONS"))?;

        let store_max_retries = env::var("STORE_MAX_RETRIES")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::InvalidValue("STORE_MAX_RETRIES"))?;

        let log_format = parse_log_format(&env::var("LOG_FORMAT").unwrap_or_default())?;

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            supported_currencies,
            run_migrations,
            store_max_retries,
            log_format,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_currencies(csv: &str) -> Result<CurrencySet, ConfigError> {
    CurrencySet::from_csv(csv)
        .ok()
        .filter(|set| !set.is_empty())
        .ok_or(ConfigError::InvalidValue("SUPPORTED_CURRENCIES"))
}

fn parse_log_format(raw: &str) -> Result<LogFormat, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "pretty" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        _ => Err(ConfigError::InvalidValue("LOG_FORMAT")),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
