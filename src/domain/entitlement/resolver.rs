//! Entitlement resolution.
//!
//! [`resolve_entitlements`] is the single function that decides which
//! features a user has. It is pure: the same state and plan features
//! always produce the same map.
//!
//! Layering, in order:
//!
//! 1. Baseline always-on features for every state except canceled and
//!    incomplete_expired (including users with no subscription at all)
//! 2. `read_only` for past_due subscriptions
//! 3. The plan's own feature rows, for trialing/active/past_due only

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::billing::{PlanFeature, SubscriptionStatus};
use crate::domain::foundation::PlanId;

/// Feature keys with special meaning to the guards.
pub mod feature_keys {
    pub const DASHBOARD: &str = "dashboard";
    pub const BILLING_PORTAL: &str = "billing_portal";
    pub const BASIC_SUPPORT: &str = "basic_support";
    pub const READ_ONLY: &str = "read_only";
    pub const STORAGE: &str = "storage";
    pub const SEATS: &str = "seats";
}

/// Features every non-ended state receives.
pub const BASELINE_FEATURES: [&str; 3] = [
    feature_keys::DASHBOARD,
    feature_keys::BILLING_PORTAL,
    feature_keys::BASIC_SUPPORT,
];

/// Subscription state as seen by the resolver; `None` means no subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    None,
    Subscribed(SubscriptionStatus),
}

impl SubscriptionState {
    fn receives_baseline(&self) -> bool {
        !matches!(
            self,
            SubscriptionState::Subscribed(
                SubscriptionStatus::Canceled | SubscriptionStatus::IncompleteExpired
            )
        )
    }

    fn receives_plan_features(&self) -> bool {
        matches!(self, SubscriptionState::Subscribed(status) if status.is_live())
    }
}

impl From<Option<SubscriptionStatus>> for SubscriptionState {
    fn from(status: Option<SubscriptionStatus>) -> Self {
        status.map_or(SubscriptionState::None, SubscriptionState::Subscribed)
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionState::None => f.write_str("none"),
            SubscriptionState::Subscribed(status) => write!(f, "{}", status),
        }
    }
}

/// Resolved decision for one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureEntitlement {
    pub enabled: bool,

    /// `None` means unlimited.
    pub limit: Option<i64>,
}

impl FeatureEntitlement {
    pub fn unlimited() -> Self {
        Self {
            enabled: true,
            limit: None,
        }
    }
}

/// Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEntitlements {
    pub subscription_state: SubscriptionState,
    pub plan_id: Option<PlanId>,
    pub features: BTreeMap<String, FeatureEntitlement>,
}

impl ResolvedEntitlements {
    pub fn feature(&self, key: &str) -> Option<&FeatureEntitlement> {
        self.features.get(key)
    }

    /// Present and enabled.
    pub fn is_enabled(&self, key: &str) -> bool {
        self.feature(key).map(|f| f.enabled).unwrap_or(false)
    }
}

/// Inputs to the resolver.
#[derive(Debug, Clone)]
pub struct EntitlementInput<'a> {
    pub subscription_state: SubscriptionState,
    pub plan_id: Option<PlanId>,

    /// `None` when there is no plan or the plan lookup failed.
    pub plan_features: Option<&'a [PlanFeature]>,
}

/// Computes the entitlement map for the given state and plan.
pub fn resolve_entitlements(input: EntitlementInput<'_>) -> ResolvedEntitlements {
    let mut features = BTreeMap::new();
    let state = input.subscription_state;

    if state.receives_baseline() {
        for key in BASELINE_FEATURES {
            features.insert(key.to_string(), FeatureEntitlement::unlimited());
        }
    }

    if state == SubscriptionState::Subscribed(SubscriptionStatus::PastDue) {
        features.insert(
            feature_keys::READ_ONLY.to_string(),
            FeatureEntitlement::unlimited(),
        );
    }

    if state.receives_plan_features() {
        for feature in input.plan_features.unwrap_or_default() {
            features.insert(
                feature.key.clone(),
                FeatureEntitlement {
                    enabled: feature.included,
                    limit: feature.limit,
                },
            );
        }
    }

    ResolvedEntitlements {
        subscription_state: state,
        plan_id: input.plan_id,
        features,
    }
}
