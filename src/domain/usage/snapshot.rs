//! Usage snapshots: one value per (tenant, metric, period).

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{TenantId, Timestamp};

use super::{AggregationType, UsagePeriod};

/// Identity of a snapshot row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotKey {
    pub tenant_id: TenantId,
    pub metric_key: String,
    pub period: UsagePeriod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub tenant_id: TenantId,
    pub metric_key: String,
    pub period: UsagePeriod,

    /// Never negative.
    pub value: i64,
    pub updated_at: Timestamp,
}

impl UsageSnapshot {
    pub fn key(&self) -> SnapshotKey {
        SnapshotKey {
            tenant_id: self.tenant_id.clone(),
            metric_key: self.metric_key.clone(),
            period: self.period,
        }
    }

    /// Applies `delta` to `existing` for `key`. A snapshot from another
    /// period is treated as absent so the old value never leaks into the
    /// new window.
    pub fn merge(
        existing: Option<&UsageSnapshot>,
        key: &SnapshotKey,
        aggregation: AggregationType,
        delta: i64,
        now: Timestamp,
    ) -> Self {
        let current = existing
            .filter(|s| s.period == key.period)
            .map(|s| s.value)
            .unwrap_or(0);
        Self {
            tenant_id: key.tenant_id.clone(),
            metric_key: key.metric_key.clone(),
            period: key.period,
            value: aggregation.apply(current, delta),
            updated_at: now,
        }
    }
}
