/// Configuration management for Engagement Service
///
/// Loads configuration from environment variables.
use crate::storage::IsolationLevel;
use anyhow::{anyhow, Context, Result};
use db_pool::env_utils::{
    parse_env_millis, parse_env_optional, parse_env_secs, parse_env_with_default,
};
use db_pool::DbConfig;
use resilience::RetryConfig;
use std::time::Duration;

pub const SERVICE_NAME: &str = "engagement-service";

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Database pool configuration
    pub database: DbConfig,
    /// Transaction retry and isolation settings
    pub consistency: ConsistencyConfig,
    /// Retention sweep settings
    pub retention: RetentionConfig,
}

/// Application settings
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// HTTP port for health checks and metrics
    pub http_port: u16,
}

#[derive(Debug, Clone)]
pub struct ConsistencyConfig {
    pub isolation: IsolationLevel,
    /// Attempts per logical operation, first try included
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        let retry = resilience::transaction_retry();
        Self {
            isolation: IsolationLevel::default(),
            max_attempts: retry.max_attempts(),
            initial_backoff: retry.initial_backoff,
            max_backoff: retry.max_backoff,
        }
    }
}

impl ConsistencyConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            initial_backoff: self.initial_backoff,
            max_backoff: self.max_backoff,
            ..resilience::transaction_retry()
        }
        .with_max_attempts(self.max_attempts)
    }
}

#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub enabled: bool,
    /// Posts older than this are deleted
    pub window: chrono::Duration,
    /// Time between sweep cycles
    pub interval: Duration,
    pub batch_size: usize,
    /// Sweep once immediately at startup instead of waiting one interval
    pub run_on_start: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: chrono::Duration::days(14),
            interval: Duration::from_secs(24 * 60 * 60),
            batch_size: crate::workers::retention_sweeper::DEFAULT_BATCH_SIZE,
            run_on_start: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: parse_env_with_default("PORT", 8010), // engagement-service default HTTP port
        };

        let database = DbConfig::from_env(SERVICE_NAME).map_err(|e| anyhow!(e))?;

        let consistency_defaults = ConsistencyConfig::default();
        let isolation = match parse_env_optional::<String>("DB_ISOLATION_LEVEL") {
            Some(raw) => raw
                .parse::<IsolationLevel>()
                .map_err(|e| anyhow!(e))
                .context("Invalid DB_ISOLATION_LEVEL")?,
            None => consistency_defaults.isolation,
        };
        let consistency = ConsistencyConfig {
            isolation,
            max_attempts: parse_env_with_default(
                "TX_MAX_ATTEMPTS",
                consistency_defaults.max_attempts,
            )
            .max(1),
            initial_backoff: parse_env_millis(
                "TX_INITIAL_BACKOFF_MS",
                consistency_defaults.initial_backoff.as_millis() as u64,
            ),
            max_backoff: parse_env_millis(
                "TX_MAX_BACKOFF_MS",
                consistency_defaults.max_backoff.as_millis() as u64,
            ),
        };

        let retention_defaults = RetentionConfig::default();
        let retention = RetentionConfig {
            enabled: parse_env_with_default("RETENTION_ENABLED", retention_defaults.enabled),
            window: parse_env_optional::<u32>("RETENTION_WINDOW_SECS")
                .map(|secs| chrono::Duration::seconds(i64::from(secs)))
                .unwrap_or(retention_defaults.window),
            interval: parse_env_secs(
                "RETENTION_INTERVAL_SECS",
                retention_defaults.interval.as_secs(),
            ),
            batch_size: parse_env_with_default(
                "RETENTION_BATCH_SIZE",
                retention_defaults.batch_size,
            )
            .max(1),
            run_on_start: parse_env_with_default(
                "RETENTION_RUN_ON_START",
                retention_defaults.run_on_start,
            ),
        };

        if retention.interval.is_zero() {
            return Err(anyhow!("RETENTION_INTERVAL_SECS must be greater than zero"));
        }

        Ok(Config {
            app,
            database,
            consistency,
            retention,
        })
    }
}
