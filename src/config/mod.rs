//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables using the
//! `config` and `dotenvy` crates. Variables use the `BILLING_ENGINE` prefix
//! and `__` separates nested values.
//!
//! # Example
//!
//! ```no_run
//! use billing_engine::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Sweeping every {:?}", config.billing.sweep_interval());
//! ```

mod billing;
mod database;
mod error;
mod payment;
mod telemetry;

pub use billing::BillingConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use telemetry::TelemetryConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Grace period, sweep cadence and catalog location
    #[serde(default)]
    pub billing: BillingConfig,

    /// Provider webhook secrets
    #[serde(default)]
    pub payment: PaymentConfig,

    /// Log filter and format
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `BILLING_ENGINE` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `BILLING_ENGINE__DATABASE__URL=...` -> `database.url = ...`
    /// - `BILLING_ENGINE__BILLING__GRACE_PERIOD_DAYS=7` -> `billing.grace_period_days = 7`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Required environment variables are missing
    /// - Values cannot be parsed into expected types
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("BILLING_ENGINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.validate()?;
        self.billing.validate()?;
        self.payment.validate()?;
        self.telemetry.validate()?;
        Ok(())
    }
}
