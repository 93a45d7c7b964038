//! Billing sweep worker.
//!
//! Periodically cancels past_due subscriptions whose grace period has
//! expired and prunes the processed-event ledger. Runs until Ctrl-C.

use std::sync::Arc;

use tokio::time::MissedTickBehavior;

use billing_engine::adapters::memory::Catalog;
use billing_engine::adapters::postgres::{
    run_migrations, PostgresBillingRepository, PostgresUsageRepository,
};
use billing_engine::application::DunningManager;
use billing_engine::config::AppConfig;
use billing_engine::domain::foundation::Timestamp;
use billing_engine::ports::{BillingEventRepository, SubscriptionGateways};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;
    billing_engine::telemetry::init_tracing(&config.telemetry)?;

    let pool = config.database.connect().await?;
    if config.database.run_migrations {
        run_migrations(&pool).await?;
    }

    let catalog = Catalog::from_file(&config.billing.catalog_path)?;
    PostgresUsageRepository::new(pool.clone())
        .sync_metrics(&catalog.metrics)
        .await?;

    let billing = Arc::new(PostgresBillingRepository::new(pool.clone()));
    // No outbound gateways are wired here; expired subscriptions are
    // canceled locally and the provider catches up through its own dunning.
    let dunning = DunningManager::new(billing.clone(), SubscriptionGateways::new())
        .with_grace_period_days(config.billing.grace_period_days);

    let mut interval = tokio::time::interval(config.billing.sweep_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        grace_period_days = config.billing.grace_period_days,
        sweep_interval_secs = config.billing.sweep_interval_secs,
        plans = catalog.plans.len(),
        metrics = catalog.metrics.len(),
        "Billing sweep worker started"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_sweep(&dunning, billing.as_ref(), config.billing.event_retention_days).await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    pool.close().await;
    Ok(())
}

async fn run_sweep(
    dunning: &DunningManager,
    ledger: &dyn BillingEventRepository,
    event_retention_days: u32,
) {
    if let Err(e) = dunning.run_grace_period_sweep().await {
        tracing::error!(error = %e, "Grace period sweep failed");
    }

    let cutoff = Timestamp::now().minus_days(i64::from(event_retention_days));
    match ledger.delete_before(cutoff).await {
        Ok(0) => {}
        Ok(pruned) => tracing::info!(pruned, "Pruned processed billing events"),
        Err(e) => tracing::warn!(error = %e, "Failed to prune billing events"),
    }
}
