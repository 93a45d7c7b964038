//! Billing engine behaviour settings

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::error::ValidationError;
use crate::domain::billing::DEFAULT_GRACE_PERIOD_DAYS;

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Days a past_due subscription keeps access before it is canceled
    #[serde(default = "default_grace_period_days")]
    pub grace_period_days: u32,

    /// How often the grace-period sweep runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Replay window for signed webhook timestamps
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: i64,

    /// Processed-event ledger rows older than this are pruned by the sweep
    #[serde(default = "default_event_retention_days")]
    pub event_retention_days: u32,

    /// YAML plan and usage-metric catalog
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
}

impl BillingConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=90).contains(&self.grace_period_days) {
            return Err(ValidationError::InvalidGracePeriod);
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidSweepInterval);
        }
        if !(1..=3600).contains(&self.webhook_tolerance_secs) {
            return Err(ValidationError::InvalidWebhookTolerance);
        }
        Ok(())
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            grace_period_days: default_grace_period_days(),
            sweep_interval_secs: default_sweep_interval(),
            webhook_tolerance_secs: default_webhook_tolerance(),
            event_retention_days: default_event_retention_days(),
            catalog_path: default_catalog_path(),
        }
    }
}

fn default_grace_period_days() -> u32 {
    DEFAULT_GRACE_PERIOD_DAYS
}

fn default_sweep_interval() -> u64 {
    3600
}

fn default_webhook_tolerance() -> i64 {
    300
}

fn default_event_retention_days() -> u32 {
    90
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("catalog.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BillingConfig::default();
        assert_eq!(config.grace_period_days, 14);
        assert_eq!(config.sweep_interval(), Duration::from_secs(3600));
        assert_eq!(config.webhook_tolerance_secs, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let zero_grace = BillingConfig {
            grace_period_days: 0,
            ..Default::default()
        };
        assert_eq!(zero_grace.validate(), Err(ValidationError::InvalidGracePeriod));

        let no_interval = BillingConfig {
            sweep_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(no_interval.validate(), Err(ValidationError::InvalidSweepInterval));

        let huge_window = BillingConfig {
            webhook_tolerance_secs: 86_400,
            ..Default::default()
        };
        assert_eq!(huge_window.validate(), Err(ValidationError::InvalidWebhookTolerance));
    }
}
