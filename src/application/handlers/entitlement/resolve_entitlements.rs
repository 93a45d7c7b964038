//! EntitlementService - resolves a user's entitlements from storage.
//!
//! At most two sequential lookups per resolution: the live subscription,
//! then its plan. Nothing is cached.

use std::sync::Arc;

use crate::domain::entitlement::{
    resolve_entitlements, EntitlementInput, ResolvedEntitlements, SubscriptionState,
};
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::{PlanRepository, SubscriptionRepository};

pub struct EntitlementService {
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanRepository>,
}

impl EntitlementService {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>, plans: Arc<dyn PlanRepository>) -> Self {
        Self {
            subscriptions,
            plans,
        }
    }

    /// Resolves entitlements for the user's live subscription.
    ///
    /// A plan that can't be loaded (dangling id or lookup failure) degrades
    /// to the baseline feature set.
    ///
    /// # Errors
    ///
    /// `DatabaseError` when the subscription lookup fails.
    pub async fn resolve_entitlements_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<ResolvedEntitlements, DomainError> {
        let Some(subscription) = self.subscriptions.find_active_by_user_id(user_id).await? else {
            return Ok(resolve_entitlements(EntitlementInput {
                subscription_state: SubscriptionState::None,
                plan_id: None,
                plan_features: None,
            }));
        };

        let plan = match self.plans.find_by_id(&subscription.plan_id).await {
            Ok(Some(plan)) => Some(plan),
            Ok(None) => {
                tracing::warn!(
                    user_id = %user_id,
                    plan_id = %subscription.plan_id,
                    "Subscription references unknown plan"
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    plan_id = %subscription.plan_id,
                    error = %e,
                    "Plan lookup failed, using baseline entitlements"
                );
                None
            }
        };

        Ok(resolve_entitlements(EntitlementInput {
            subscription_state: SubscriptionState::Subscribed(subscription.status),
            plan_id: Some(subscription.plan_id.clone()),
            plan_features: plan.as_ref().map(|p| p.features.as_slice()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryBillingStore, InMemoryPlanCatalog};
    use crate::domain::billing::{
        BillingInterval, NewSubscription, Plan, PlanFeature, Provider, Subscription,
        SubscriptionStatus,
    };
    use crate::domain::entitlement::feature_keys;
    use crate::domain::foundation::{PlanId, Timestamp};
    use std::collections::HashMap;

    fn plan() -> Plan {
        Plan {
            id: PlanId::new("pro_monthly").unwrap(),
            name: "Pro".to_string(),
            price_cents: 2900,
            currency: "usd".to_string(),
            interval: BillingInterval::Month,
            is_active: true,
            features: vec![PlanFeature::limited(feature_keys::STORAGE, 100)],
        }
    }

    async fn store_with(status: SubscriptionStatus, plan_id: &str) -> InMemoryBillingStore {
        let store = InMemoryBillingStore::new();
        store
            .insert_subscription(Subscription::create(
                NewSubscription {
                    user_id: UserId::new("user-1").unwrap(),
                    plan_id: PlanId::new(plan_id).unwrap(),
                    provider: Provider::Stripe,
                    provider_subscription_id: "sub_1".to_string(),
                    provider_customer_id: "cus_1".to_string(),
                    status,
                    current_period_start: None,
                    current_period_end: None,
                    trial_end: None,
                    metadata: HashMap::new(),
                },
                Timestamp::now(),
            ))
            .await;
        store
    }

    #[tokio::test]
    async fn active_subscription_gets_plan_features() {
        let store = store_with(SubscriptionStatus::Active, "pro_monthly").await;
        let service = EntitlementService::new(
            Arc::new(store),
            Arc::new(InMemoryPlanCatalog::with_plans(vec![plan()])),
        );

        let resolved = service
            .resolve_entitlements_for_user(&UserId::new("user-1").unwrap())
            .await
            .unwrap();

        assert_eq!(resolved.plan_id, Some(PlanId::new("pro_monthly").unwrap()));
        assert_eq!(resolved.feature(feature_keys::STORAGE).and_then(|f| f.limit), Some(100));
    }

    #[tokio::test]
    async fn user_without_subscription_gets_state_none() {
        let service = EntitlementService::new(
            Arc::new(InMemoryBillingStore::new()),
            Arc::new(InMemoryPlanCatalog::with_plans(vec![plan()])),
        );

        let resolved = service
            .resolve_entitlements_for_user(&UserId::new("nobody").unwrap())
            .await
            .unwrap();

        assert_eq!(resolved.subscription_state, SubscriptionState::None);
        assert!(resolved.is_enabled(feature_keys::DASHBOARD));
    }

    #[tokio::test]
    async fn dangling_plan_degrades_to_baseline() {
        let store = store_with(SubscriptionStatus::Active, "retired_plan").await;
        let service = EntitlementService::new(
            Arc::new(store),
            Arc::new(InMemoryPlanCatalog::with_plans(vec![plan()])),
        );

        let resolved = service
            .resolve_entitlements_for_user(&UserId::new("user-1").unwrap())
            .await
            .unwrap();

        assert!(resolved.is_enabled(feature_keys::DASHBOARD));
        assert!(resolved.feature(feature_keys::STORAGE).is_none());
    }
}
