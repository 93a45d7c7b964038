//! Grace period evaluation for past-due subscriptions.
//!
//! The window is measured from `updated_at`, the moment the subscription
//! last changed (normally its entry into past_due).

use crate::domain::foundation::{SubscriptionId, Timestamp};
use serde::Serialize;

use super::Subscription;

/// Default grace period before a past-due subscription is canceled.
pub const DEFAULT_GRACE_PERIOD_DAYS: u32 = 14;

/// Derived view, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GracePeriodStatus {
    pub subscription_id: SubscriptionId,
    pub started_at: Timestamp,
    pub expires_at: Timestamp,
    pub expired: bool,
}

impl GracePeriodStatus {
    /// `expired` holds once `now >= updated_at + grace_period_days`.
    pub fn evaluate(subscription: &Subscription, grace_period_days: u32, now: Timestamp) -> Self {
        let started_at = subscription.updated_at;
        let expires_at = started_at.add_days(i64::from(grace_period_days));
        Self {
            subscription_id: subscription.id,
            started_at,
            expires_at,
            expired: now >= expires_at,
        }
    }

    /// Whole days left before expiry, zero once expired.
    pub fn days_remaining(&self, now: Timestamp) -> i64 {
        self.expires_at.duration_since(&now).num_days().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::{NewSubscription, Provider, SubscriptionStatus};
    use crate::domain::foundation::{PlanId, UserId};
    use std::collections::HashMap;

    fn past_due_since(updated_at: Timestamp) -> Subscription {
        let mut sub = Subscription::create(
            NewSubscription {
                user_id: UserId::new("u").unwrap(),
                plan_id: PlanId::new("p").unwrap(),
                provider: Provider::Stripe,
                provider_subscription_id: "sub".to_string(),
                provider_customer_id: "cus".to_string(),
                status: SubscriptionStatus::PastDue,
                current_period_start: None,
                current_period_end: None,
                trial_end: None,
                metadata: HashMap::new(),
            },
            updated_at,
        );
        sub.updated_at = updated_at;
        sub
    }

    #[test]
    fn fifteen_days_past_due_is_expired() {
        let now = Timestamp::now();
        let status = GracePeriodStatus::evaluate(&past_due_since(now.minus_days(15)), 14, now);
        assert!(status.expired);
        assert_eq!(status.days_remaining(now), 0);
    }

    #[test]
    fn ten_days_past_due_is_still_in_grace() {
        let now = Timestamp::now();
        let status = GracePeriodStatus::evaluate(&past_due_since(now.minus_days(10)), 14, now);
        assert!(!status.expired);
        assert_eq!(status.days_remaining(now), 4);
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let now = Timestamp::now();
        let status = GracePeriodStatus::evaluate(&past_due_since(now.minus_days(14)), 14, now);
        assert!(status.expired);
    }
}
