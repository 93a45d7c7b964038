//! Usage metering ports: the metric catalog and per-period snapshots.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, TenantId};
use crate::domain::usage::{AggregationType, SnapshotKey, UsageMetric, UsageSnapshot};

/// Read access to the static metric catalog.
#[async_trait]
pub trait UsageMetricRepository: Send + Sync {
    async fn find_by_key(&self, key: &str) -> Result<Option<UsageMetric>, DomainError>;

    /// Every catalog metric, ordered by key.
    async fn find_all(&self) -> Result<Vec<UsageMetric>, DomainError>;
}

/// Snapshot storage.
///
/// `upsert` performs the read-modify-write inside the store (a single lock
/// or a single `INSERT ... ON CONFLICT DO UPDATE`) so concurrent increments
/// for the same key never lose updates.
#[async_trait]
pub trait UsageSnapshotRepository: Send + Sync {
    /// Snapshot stored under exactly `key` (tenant, metric and both period
    /// bounds).
    async fn find_by_snapshot_key(&self, key: &SnapshotKey)
        -> Result<Option<UsageSnapshot>, DomainError>;

    /// Snapshot with the latest period for the pair, ties broken by the
    /// later period end.
    async fn find_by_tenant_and_metric(
        &self,
        tenant_id: &TenantId,
        metric_key: &str,
    ) -> Result<Option<UsageSnapshot>, DomainError>;

    /// Every snapshot of the tenant, any period.
    async fn find_by_tenant_id(&self, tenant_id: &TenantId)
        -> Result<Vec<UsageSnapshot>, DomainError>;

    /// Merges `delta` into the snapshot at `key` using `aggregation`,
    /// creating it from zero when absent. Returns the stored snapshot.
    async fn upsert(
        &self,
        key: &SnapshotKey,
        aggregation: AggregationType,
        delta: i64,
    ) -> Result<UsageSnapshot, DomainError>;
}
