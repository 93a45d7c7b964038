//! UsageMeteringService - records consumption and reports it against limits.
//!
//! Periods default to the calendar month in UTC. The merge of a delta into
//! the stored value happens inside the snapshot store so concurrent writers
//! for the same (tenant, metric, period) never lose updates.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::foundation::{TenantId, Timestamp};
use crate::domain::usage::{
    MetricUsage, SnapshotKey, TenantUsageSummary, UsageError, UsageLimit, UsageMetric,
    UsagePeriod, UsageSnapshot,
};
use crate::ports::{UsageMetricRepository, UsageSnapshotRepository};

/// Command to record one usage delta.
#[derive(Debug, Clone)]
pub struct RecordUsageCommand {
    pub metric_key: String,
    pub tenant_id: TenantId,
    pub delta: i64,
    pub period_start: Option<Timestamp>,
    pub period_end: Option<Timestamp>,
}

impl RecordUsageCommand {
    /// Delta for the current calendar month.
    pub fn new(metric_key: impl Into<String>, tenant_id: TenantId, delta: i64) -> Self {
        Self {
            metric_key: metric_key.into(),
            tenant_id,
            delta,
            period_start: None,
            period_end: None,
        }
    }

    pub fn in_period(mut self, period: UsagePeriod) -> Self {
        self.period_start = Some(period.start);
        self.period_end = Some(period.end);
        self
    }
}

pub struct UsageMeteringService {
    metrics: Arc<dyn UsageMetricRepository>,
    snapshots: Arc<dyn UsageSnapshotRepository>,
}

impl UsageMeteringService {
    pub fn new(
        metrics: Arc<dyn UsageMetricRepository>,
        snapshots: Arc<dyn UsageSnapshotRepository>,
    ) -> Self {
        Self { metrics, snapshots }
    }

    /// Merges `cmd.delta` into the tenant's snapshot for the period using
    /// the metric's aggregation type.
    ///
    /// # Errors
    ///
    /// - `UnknownMetric` when the key is not in the catalog
    /// - `Invalid` when the explicit period bounds are empty
    pub async fn record_usage(&self, cmd: RecordUsageCommand) -> Result<UsageSnapshot, UsageError> {
        let metric = self.require_metric(&cmd.metric_key).await?;
        let period = UsagePeriod::resolve(cmd.period_start, cmd.period_end, Timestamp::now())?;

        let key = SnapshotKey {
            tenant_id: cmd.tenant_id,
            metric_key: metric.key,
            period,
        };
        let snapshot = self.snapshots.upsert(&key, metric.aggregation, cmd.delta).await?;

        tracing::debug!(
            tenant_id = %key.tenant_id,
            metric_key = %key.metric_key,
            aggregation = %metric.aggregation,
            delta = cmd.delta,
            value = snapshot.value,
            "Usage recorded"
        );
        Ok(snapshot)
    }

    /// Value recorded for the metric in `period`, `0` when nothing was
    /// recorded in that window.
    pub async fn current_value(
        &self,
        tenant_id: &TenantId,
        metric_key: &str,
        period: UsagePeriod,
    ) -> Result<i64, UsageError> {
        let key = SnapshotKey {
            tenant_id: tenant_id.clone(),
            metric_key: metric_key.to_string(),
            period,
        };
        let snapshot = self.snapshots.find_by_snapshot_key(&key).await?;
        Ok(snapshot.map(|s| s.value).unwrap_or(0))
    }

    /// Current-month usage of one catalog metric against `limit`.
    ///
    /// # Errors
    ///
    /// `UnknownMetric` when the key is not in the catalog.
    pub async fn get_usage(
        &self,
        tenant_id: &TenantId,
        metric_key: &str,
        limit: UsageLimit,
    ) -> Result<MetricUsage, UsageError> {
        let metric = self.require_metric(metric_key).await?;
        let current = self
            .current_value(tenant_id, metric_key, UsagePeriod::current_month())
            .await?;
        Ok(metric_usage(&metric, current, limit))
    }

    /// Current-month summary; see [`Self::get_usage_summary_for`].
    pub async fn get_usage_summary(
        &self,
        tenant_id: &TenantId,
        limits: &HashMap<String, UsageLimit>,
    ) -> Result<TenantUsageSummary, UsageError> {
        self.get_usage_summary_for(tenant_id, UsagePeriod::current_month(), limits)
            .await
    }

    /// Lists every catalog metric, including ones with no recorded usage.
    /// Metrics without an entry in `limits` report the `-1` sentinel.
    pub async fn get_usage_summary_for(
        &self,
        tenant_id: &TenantId,
        period: UsagePeriod,
        limits: &HashMap<String, UsageLimit>,
    ) -> Result<TenantUsageSummary, UsageError> {
        let catalog = self.metrics.find_all().await?;
        let in_period: HashMap<String, i64> = self
            .snapshots
            .find_by_tenant_id(tenant_id)
            .await?
            .into_iter()
            .filter(|s| s.period == period)
            .map(|s| (s.metric_key, s.value))
            .collect();

        let metrics = catalog
            .iter()
            .map(|metric| {
                let current = in_period.get(&metric.key).copied().unwrap_or(0);
                let limit = limits
                    .get(&metric.key)
                    .copied()
                    .unwrap_or(UsageLimit::Unlimited);
                metric_usage(metric, current, limit)
            })
            .collect();

        Ok(TenantUsageSummary {
            tenant_id: tenant_id.clone(),
            metrics,
            period_start: period.start.to_iso8601(),
            period_end: period.end.to_iso8601(),
        })
    }

    /// Passes without reading usage when `limit` is unlimited.
    ///
    /// # Errors
    ///
    /// `LimitExceeded` when current-month usage is at or above `limit`.
    pub async fn assert_within_usage_limit(
        &self,
        metric_key: &str,
        tenant_id: &TenantId,
        limit: UsageLimit,
    ) -> Result<(), UsageError> {
        let UsageLimit::Limited(limit) = limit else {
            return Ok(());
        };

        let current = self
            .current_value(tenant_id, metric_key, UsagePeriod::current_month())
            .await?;
        if current >= limit {
            tracing::info!(
                tenant_id = %tenant_id,
                metric_key = metric_key,
                current,
                limit,
                "Usage limit reached"
            );
            return Err(UsageError::LimitExceeded {
                metric_key: metric_key.to_string(),
                tenant_id: tenant_id.clone(),
                current,
                limit,
            });
        }
        Ok(())
    }

    async fn require_metric(&self, metric_key: &str) -> Result<UsageMetric, UsageError> {
        self.metrics
            .find_by_key(metric_key)
            .await?
            .ok_or_else(|| UsageError::UnknownMetric(metric_key.to_string()))
    }
}

fn metric_usage(metric: &UsageMetric, current: i64, limit: UsageLimit) -> MetricUsage {
    MetricUsage {
        metric_key: metric.key.clone(),
        display_name: metric.display_name.clone(),
        unit: metric.unit.clone(),
        current_value: current,
        limit: limit.as_raw(),
        percent_used: limit.percent_used(current),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryUsageStore;
    use crate::domain::usage::AggregationType;

    fn tenant() -> TenantId {
        TenantId::new("tenant-1").unwrap()
    }

    fn store() -> InMemoryUsageStore {
        InMemoryUsageStore::with_metrics(vec![
            UsageMetric::new("api_calls", "API Calls", "calls", AggregationType::Sum),
            UsageMetric::new("peak_sessions", "Peak Sessions", "sessions", AggregationType::Max),
            UsageMetric::new("storage_gb", "Storage", "GB", AggregationType::Last),
        ])
    }

    fn service(store: &InMemoryUsageStore) -> UsageMeteringService {
        UsageMeteringService::new(Arc::new(store.clone()), Arc::new(store.clone()))
    }

    fn month(at: &str) -> UsagePeriod {
        UsagePeriod::month_containing(Timestamp::parse_rfc3339(at).unwrap())
    }

    // ══════════════════════════════════════════════════════════════
    // Recording
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn sum_accumulates_within_period() {
        let store = store();
        let service = service(&store);

        service
            .record_usage(RecordUsageCommand::new("api_calls", tenant(), 10))
            .await
            .unwrap();
        let snapshot = service
            .record_usage(RecordUsageCommand::new("api_calls", tenant(), 25))
            .await
            .unwrap();

        assert_eq!(snapshot.value, 35);
    }

    #[tokio::test]
    async fn new_period_starts_fresh() {
        let store = store();
        let service = service(&store);

        service
            .record_usage(
                RecordUsageCommand::new("api_calls", tenant(), 500)
                    .in_period(month("2024-01-15T00:00:00Z")),
            )
            .await
            .unwrap();
        let snapshot = service
            .record_usage(
                RecordUsageCommand::new("api_calls", tenant(), 7)
                    .in_period(month("2024-02-15T00:00:00Z")),
            )
            .await
            .unwrap();

        assert_eq!(snapshot.value, 7);
    }

    #[tokio::test]
    async fn later_period_does_not_hide_current_month() {
        let store = store();
        let service = service(&store);
        service
            .record_usage(RecordUsageCommand::new("api_calls", tenant(), 500))
            .await
            .unwrap();
        service
            .record_usage(
                RecordUsageCommand::new("api_calls", tenant(), 1)
                    .in_period(UsagePeriod::month_containing(Timestamp::now().add_days(40))),
            )
            .await
            .unwrap();

        let current = service
            .current_value(&tenant(), "api_calls", UsagePeriod::current_month())
            .await
            .unwrap();
        assert_eq!(current, 500);

        let err = service
            .assert_within_usage_limit("api_calls", &tenant(), UsageLimit::Limited(100))
            .await
            .unwrap_err();
        assert!(matches!(err, UsageError::LimitExceeded { current: 500, limit: 100, .. }));
    }

    #[tokio::test]
    async fn max_and_last_aggregations() {
        let store = store();
        let service = service(&store);

        for delta in [5, 12, 3] {
            service
                .record_usage(RecordUsageCommand::new("peak_sessions", tenant(), delta))
                .await
                .unwrap();
            service
                .record_usage(RecordUsageCommand::new("storage_gb", tenant(), delta))
                .await
                .unwrap();
        }

        let period = UsagePeriod::current_month();
        assert_eq!(service.current_value(&tenant(), "peak_sessions", period).await.unwrap(), 12);
        assert_eq!(service.current_value(&tenant(), "storage_gb", period).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn unknown_metric_is_rejected() {
        let store = store();
        let err = service(&store)
            .record_usage(RecordUsageCommand::new("bogus", tenant(), 1))
            .await
            .unwrap_err();

        assert!(matches!(err, UsageError::UnknownMetric(key) if key == "bogus"));
    }

    #[tokio::test]
    async fn empty_explicit_period_is_invalid() {
        let store = store();
        let start = Timestamp::parse_rfc3339("2024-03-01T00:00:00Z").unwrap();
        let cmd = RecordUsageCommand {
            period_start: Some(start),
            period_end: Some(start),
            ..RecordUsageCommand::new("api_calls", tenant(), 1)
        };

        let err = service(&store).record_usage(cmd).await.unwrap_err();
        assert!(matches!(err, UsageError::Invalid(_)));
    }

    // ══════════════════════════════════════════════════════════════
    // Reporting
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn summary_lists_every_catalog_metric() {
        let store = store();
        let service = service(&store);
        service
            .record_usage(RecordUsageCommand::new("api_calls", tenant(), 250))
            .await
            .unwrap();

        let mut limits = HashMap::new();
        limits.insert("api_calls".to_string(), UsageLimit::Limited(1000));
        let summary = service.get_usage_summary(&tenant(), &limits).await.unwrap();

        assert_eq!(summary.metrics.len(), 3);
        let api = summary.metric("api_calls").unwrap();
        assert_eq!(api.current_value, 250);
        assert_eq!(api.limit, 1000);
        assert_eq!(api.percent_used, 25);

        let storage = summary.metric("storage_gb").unwrap();
        assert_eq!(storage.current_value, 0);
        assert_eq!(storage.limit, -1);
        assert_eq!(storage.percent_used, 0);
        assert_eq!(summary.period_start, UsagePeriod::current_month().start.to_iso8601());
    }

    // ══════════════════════════════════════════════════════════════
    // Limits
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn unlimited_never_reads_usage() {
        let store = store();
        let service = service(&store);
        service
            .record_usage(RecordUsageCommand::new("api_calls", tenant(), 1_000_000))
            .await
            .unwrap();
        let reads_before = store.snapshot_reads();

        service
            .assert_within_usage_limit("api_calls", &tenant(), UsageLimit::from_raw(-1))
            .await
            .unwrap();
        service
            .assert_within_usage_limit("api_calls", &tenant(), UsageLimit::from_f64(f64::INFINITY))
            .await
            .unwrap();

        assert_eq!(store.snapshot_reads(), reads_before);
    }

    #[tokio::test]
    async fn at_limit_fails_with_both_values() {
        let store = store();
        let service = service(&store);
        service
            .record_usage(RecordUsageCommand::new("api_calls", tenant(), 100))
            .await
            .unwrap();

        let err = service
            .assert_within_usage_limit("api_calls", &tenant(), UsageLimit::Limited(100))
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("current 100"));
        assert!(message.contains("limit 100"));
    }
}
