//! Usage metering domain module.
//!
//! Catalog metrics, aggregation strategies, calendar-month periods and the
//! per-period snapshots consumption is recorded into.

mod errors;
mod limit;
mod metric;
mod period;
mod snapshot;
mod summary;

pub use errors::UsageError;
pub use limit::{UsageLimit, UNLIMITED_SENTINEL};
pub use metric::{AggregationType, UsageMetric};
pub use period::UsagePeriod;
pub use snapshot::{SnapshotKey, UsageSnapshot};
pub use summary::{MetricUsage, TenantUsageSummary};
