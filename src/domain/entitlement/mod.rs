//! Entitlement domain module.
//!
//! Turns (subscription state, plan features) into per-feature
//! enable/limit decisions and reports usage against those limits.

mod errors;
mod resolver;
mod usage_report;

pub use errors::{EntitlementError, ForbiddenCode};
pub use resolver::{
    feature_keys, resolve_entitlements, EntitlementInput, FeatureEntitlement,
    ResolvedEntitlements, SubscriptionState, BASELINE_FEATURES,
};
pub use usage_report::{LimitUsage, SeatUsage, StorageUsage, BYTES_PER_MB};
