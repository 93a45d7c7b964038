//! Postgres pool settings for the billing store

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use super::error::ValidationError;

/// Upper bound on `max_connections`; the worker runs one sweep at a time.
const MAX_POOL_SIZE: u32 = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `postgres://` or `postgresql://` URL. Redacted in `Debug` output.
    pub url: SecretString,

    #[serde(default)]
    pub min_connections: u32,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for a free connection before a sweep step fails
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Seconds before an idle connection is closed; `0` keeps them open
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Apply `migrations/` before the first sweep
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .min_connections(self.min_connections)
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout())
            .idle_timeout(self.idle_timeout())
    }

    /// Connects eagerly so a bad URL fails at startup, not on the first sweep.
    pub async fn connect(&self) -> Result<PgPool, sqlx::Error> {
        self.pool_options().connect(self.url.expose_secret()).await
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let url = self.url.expose_secret();
        if url.trim().is_empty() {
            return Err(ValidationError::MissingRequired("DATABASE__URL"));
        }
        if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
            return Err(ValidationError::InvalidDatabaseUrl);
        }
        if self.max_connections == 0 || self.min_connections > self.max_connections {
            return Err(ValidationError::InvalidPoolSize);
        }
        if self.max_connections > MAX_POOL_SIZE {
            return Err(ValidationError::PoolSizeTooLarge);
        }
        Ok(())
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> u64 {
    10
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_run_migrations() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_url(url: &str) -> DatabaseConfig {
        DatabaseConfig {
            url: SecretString::new(url.to_string()),
            min_connections: 0,
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            run_migrations: true,
        }
    }

    #[test]
    fn url_is_redacted_in_debug_output() {
        let config = with_url("postgresql://billing:hunter2@db/billing");
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn zero_idle_timeout_keeps_connections() {
        let mut config = with_url("postgresql://localhost/billing");
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(300)));

        config.idle_timeout_secs = 0;
        assert_eq!(config.idle_timeout(), None);
    }

    #[test]
    fn validation_rejects_bad_urls() {
        assert_eq!(
            with_url("  ").validate(),
            Err(ValidationError::MissingRequired("DATABASE__URL"))
        );
        assert_eq!(
            with_url("mysql://localhost/billing").validate(),
            Err(ValidationError::InvalidDatabaseUrl)
        );
    }

    #[test]
    fn validation_rejects_bad_pool_bounds() {
        let mut config = with_url("postgres://localhost/billing");
        config.min_connections = 6;
        assert_eq!(config.validate(), Err(ValidationError::InvalidPoolSize));

        config.min_connections = 0;
        config.max_connections = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidPoolSize));

        config.max_connections = MAX_POOL_SIZE + 1;
        assert_eq!(config.validate(), Err(ValidationError::PoolSizeTooLarge));

        config.max_connections = MAX_POOL_SIZE;
        assert!(config.validate().is_ok());
    }
}
