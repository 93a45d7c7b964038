//! In-memory usage metric catalog and snapshot store.
//!
//! `upsert` reads, merges and writes under a single lock, so concurrent
//! deltas for the same key are never lost.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, TenantId, Timestamp};
use crate::domain::usage::{AggregationType, SnapshotKey, UsageMetric, UsageSnapshot};
use crate::ports::{UsageMetricRepository, UsageSnapshotRepository};

#[derive(Clone, Default)]
pub struct InMemoryUsageStore {
    metrics: Arc<HashMap<String, UsageMetric>>,
    snapshots: Arc<RwLock<HashMap<SnapshotKey, UsageSnapshot>>>,
    snapshot_reads: Arc<AtomicUsize>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(metrics: Vec<UsageMetric>) -> Self {
        Self {
            metrics: Arc::new(metrics.into_iter().map(|m| (m.key.clone(), m)).collect()),
            ..Self::default()
        }
    }

    /// Number of snapshot read queries served so far.
    pub fn snapshot_reads(&self) -> usize {
        self.snapshot_reads.load(Ordering::SeqCst)
    }

    fn count_read(&self) {
        self.snapshot_reads.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl UsageMetricRepository for InMemoryUsageStore {
    async fn find_by_key(&self, key: &str) -> Result<Option<UsageMetric>, DomainError> {
        Ok(self.metrics.get(key).cloned())
    }

    async fn find_all(&self) -> Result<Vec<UsageMetric>, DomainError> {
        let mut metrics: Vec<UsageMetric> = self.metrics.values().cloned().collect();
        metrics.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(metrics)
    }
}

#[async_trait]
impl UsageSnapshotRepository for InMemoryUsageStore {
    async fn find_by_snapshot_key(
        &self,
        key: &SnapshotKey,
    ) -> Result<Option<UsageSnapshot>, DomainError> {
        self.count_read();
        Ok(self.snapshots.read().await.get(key).cloned())
    }

    async fn find_by_tenant_and_metric(
        &self,
        tenant_id: &TenantId,
        metric_key: &str,
    ) -> Result<Option<UsageSnapshot>, DomainError> {
        self.count_read();
        Ok(self
            .snapshots
            .read()
            .await
            .values()
            .filter(|s| &s.tenant_id == tenant_id && s.metric_key == metric_key)
            .max_by_key(|s| (s.period.start, s.period.end))
            .cloned())
    }

    async fn find_by_tenant_id(&self, tenant_id: &TenantId) -> Result<Vec<UsageSnapshot>, DomainError> {
        self.count_read();
        let mut found: Vec<UsageSnapshot> = self
            .snapshots
            .read()
            .await
            .values()
            .filter(|s| &s.tenant_id == tenant_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            a.metric_key
                .cmp(&b.metric_key)
                .then(a.period.start.cmp(&b.period.start))
                .then(a.period.end.cmp(&b.period.end))
        });
        Ok(found)
    }

    async fn upsert(
        &self,
        key: &SnapshotKey,
        aggregation: AggregationType,
        delta: i64,
    ) -> Result<UsageSnapshot, DomainError> {
        let mut snapshots = self.snapshots.write().await;
        let merged = UsageSnapshot::merge(snapshots.get(key), key, aggregation, delta, Timestamp::now());
        snapshots.insert(key.clone(), merged.clone());
        Ok(merged)
    }
}
