//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool max_connections must be non-zero and at least min_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (50)")]
    PoolSizeTooLarge,

    #[error("Grace period must be between 1 and 90 days")]
    InvalidGracePeriod,

    #[error("Sweep interval must be at least 1 second")]
    InvalidSweepInterval,

    #[error("Webhook tolerance must be between 1 and 3600 seconds")]
    InvalidWebhookTolerance,

    #[error("No payment provider webhook secret configured")]
    NoProviderConfigured,

    #[error("Invalid Stripe webhook secret format")]
    InvalidStripeWebhookSecret,

    #[error("Invalid log filter directive: {0}")]
    InvalidLogLevel(String),
}
