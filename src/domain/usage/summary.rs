//! Usage reporting shapes.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::TenantId;

/// One metric's usage in a period against its limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricUsage {
    pub metric_key: String,
    pub display_name: String,
    pub unit: String,
    pub current_value: i64,

    /// `-1` when no limit applies.
    pub limit: i64,
    pub percent_used: u32,
}

/// Usage for every catalog metric of a tenant. Period bounds are ISO-8601.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantUsageSummary {
    pub tenant_id: TenantId,
    pub metrics: Vec<MetricUsage>,
    pub period_start: String,
    pub period_end: String,
}

impl TenantUsageSummary {
    pub fn metric(&self, key: &str) -> Option<&MetricUsage> {
        self.metrics.iter().find(|m| m.metric_key == key)
    }
}
