//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Environment (development, production)
    pub environment: String,

    pub engine: EngineConfig,

    pub audit: AuditConfig,
}

/// Ledger engine tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Retries after a compare-and-set conflict before it is surfaced
    pub max_conflict_retries: u32,

    /// Base backoff between conflict retries, scaled by attempt number
    pub retry_backoff: Duration,

    /// Default deadline for waiting on an account's serialization.
    /// `None` waits indefinitely.
    pub lock_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
            retry_backoff: Duration::from_millis(50),
            lock_timeout: None,
        }
    }
}

impl EngineConfig {
    /// Total commit attempts, the first included
    pub fn max_attempts(&self) -> u32 {
        self.max_conflict_retries.saturating_add(1)
    }

    /// Backoff before retry number `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.retry_backoff.saturating_mul(attempt)
    }
}

/// Audit queue tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditConfig {
    /// Entries buffered before new ones are dropped
    pub queue_capacity: usize,

    /// Write attempts per entry before it is given up
    pub max_write_attempts: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_write_attempts: 3,
        }
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(name)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 10u32)?;
        if database_max_connections == 0 {
            return Err(ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"));
        }

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let engine_defaults = EngineConfig::default();
        let lock_timeout = match env::var("LEDGER_LOCK_TIMEOUT_MS") {
            Ok(raw) => Some(Duration::from_millis(
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("LEDGER_LOCK_TIMEOUT_MS"))?,
            )),
            Err(_) => None,
        };
        let engine = EngineConfig {
            max_conflict_retries: parse_or(
                "LEDGER_MAX_CONFLICT_RETRIES",
                engine_defaults.max_conflict_retries,
            )?,
            retry_backoff: Duration::from_millis(parse_or("LEDGER_RETRY_BACKOFF_MS", 50u64)?),
            lock_timeout,
        };

        let audit_defaults = AuditConfig::default();
        let audit = AuditConfig {
            queue_capacity: parse_or("AUDIT_QUEUE_CAPACITY", audit_defaults.queue_capacity)?,
            max_write_attempts: parse_or(
                "AUDIT_MAX_WRITE_ATTEMPTS",
                audit_defaults.max_write_attempts,
            )?,
        };
        if audit.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue("AUDIT_QUEUE_CAPACITY"));
        }
        if audit.max_write_attempts == 0 {
            return Err(ConfigError::InvalidValue("AUDIT_MAX_WRITE_ATTEMPTS"));
        }

        Ok(Self {
            database_url,
            database_max_connections,
            environment,
            engine,
            audit,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
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
