//! CancelSubscriptionHandler - Command handler for user-initiated cancellation.

use std::sync::Arc;

use crate::domain::billing::{Subscription, SubscriptionError};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{SubscriptionGateways, SubscriptionRepository};

/// Command to cancel the user's live subscription.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub user_id: UserId,

    /// End access now instead of at the current period end.
    pub immediate: bool,
}

#[derive(Debug, Clone)]
pub struct CancelSubscriptionResult {
    pub subscription: Subscription,

    /// When access ends; `None` if the period end is unknown.
    pub effective_at: Option<Timestamp>,
}

/// Handler for cancelling subscriptions.
///
/// The lifecycle is checked before the provider is called so an invalid
/// request never reaches the provider.
pub struct CancelSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    gateways: SubscriptionGateways,
}

impl CancelSubscriptionHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>, gateways: SubscriptionGateways) -> Self {
        Self {
            subscriptions,
            gateways,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<CancelSubscriptionResult, SubscriptionError> {
        // 1. Find the user's live subscription
        let current = self
            .subscriptions
            .find_active_by_user_id(&cmd.user_id)
            .await?
            .ok_or_else(|| SubscriptionError::NotFound(format!("user {}", cmd.user_id)))?;

        // 2. Apply the domain change on a copy
        let now = Timestamp::now();
        let mut subscription = current.clone();
        if cmd.immediate {
            subscription.cancel_immediately(now)?;
        } else {
            subscription.schedule_cancellation(now)?;
        }

        // 3. Tell the provider
        let gateway = self.gateways.get(subscription.provider).ok_or_else(|| {
            SubscriptionError::Provider(format!(
                "No gateway registered for {}",
                subscription.provider
            ))
        })?;
        match gateway
            .cancel_subscription(&subscription.provider_subscription_id, cmd.immediate)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_already_canceled() => {
                tracing::debug!(
                    subscription_id = %subscription.id,
                    "Provider already canceled subscription"
                );
            }
            Err(e) => return Err(SubscriptionError::Provider(e.to_string())),
        }

        // 4. Persist
        self.subscriptions.update(&subscription).await?;

        let effective_at = if cmd.immediate {
            Some(now)
        } else {
            subscription.current_period_end
        };

        tracing::info!(
            subscription_id = %subscription.id,
            user_id = %subscription.user_id,
            immediate = cmd.immediate,
            "Subscription cancellation requested"
        );

        Ok(CancelSubscriptionResult {
            subscription,
            effective_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::adapters::payment::MockSubscriptionGateway;
    use crate::domain::billing::{CancelReason, NewSubscription, Provider, SubscriptionStatus};
    use crate::domain::foundation::PlanId;
    use crate::ports::{PaymentError, PaymentErrorCode};
    use std::collections::HashMap;

    async fn store_with(status: SubscriptionStatus) -> InMemoryBillingStore {
        let store = InMemoryBillingStore::new();
        store
            .insert_subscription(Subscription::create(
                NewSubscription {
                    user_id: UserId::new("user-1").unwrap(),
                    plan_id: PlanId::new("pro_monthly").unwrap(),
                    provider: Provider::Stripe,
                    provider_subscription_id: "sub_1".to_string(),
                    provider_customer_id: "cus_1".to_string(),
                    status,
                    current_period_start: None,
                    current_period_end: Some(Timestamp::now().add_days(20)),
                    trial_end: None,
                    metadata: HashMap::new(),
                },
                Timestamp::now(),
            ))
            .await;
        store
    }

    fn command(immediate: bool) -> CancelSubscriptionCommand {
        CancelSubscriptionCommand {
            user_id: UserId::new("user-1").unwrap(),
            immediate,
        }
    }

    #[tokio::test]
    async fn immediate_cancel_ends_subscription() {
        let store = store_with(SubscriptionStatus::Active).await;
        let gateway = Arc::new(MockSubscriptionGateway::new(Provider::Stripe));
        let handler = CancelSubscriptionHandler::new(
            Arc::new(store.clone()),
            SubscriptionGateways::new().with(gateway.clone()),
        );

        let result = handler.handle(command(true)).await.unwrap();

        assert_eq!(result.subscription.status, SubscriptionStatus::Canceled);
        assert_eq!(result.subscription.cancel_reason, Some(CancelReason::UserRequested));
        assert_eq!(gateway.cancel_calls(), vec![("sub_1".to_string(), true)]);
        let stored = store.subscription_by_provider_id("sub_1").await.unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Canceled);
    }

    #[tokio::test]
    async fn period_end_cancel_keeps_status() {
        let store = store_with(SubscriptionStatus::Active).await;
        let gateway = Arc::new(MockSubscriptionGateway::new(Provider::Stripe));
        let handler = CancelSubscriptionHandler::new(
            Arc::new(store.clone()),
            SubscriptionGateways::new().with(gateway),
        );

        let result = handler.handle(command(false)).await.unwrap();

        assert_eq!(result.subscription.status, SubscriptionStatus::Active);
        assert!(result.subscription.cancel_at_period_end);
        assert_eq!(result.effective_at, result.subscription.current_period_end);
    }

    #[tokio::test]
    async fn past_due_cannot_schedule_cancellation() {
        let store = store_with(SubscriptionStatus::PastDue).await;
        let gateway = Arc::new(MockSubscriptionGateway::new(Provider::Stripe));
        let handler = CancelSubscriptionHandler::new(
            Arc::new(store),
            SubscriptionGateways::new().with(gateway.clone()),
        );

        let err = handler.handle(command(false)).await.unwrap_err();

        assert!(matches!(err, SubscriptionError::InvalidState(_)));
        assert!(gateway.cancel_calls().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_leaves_record_untouched() {
        let store = store_with(SubscriptionStatus::Active).await;
        let gateway = Arc::new(
            MockSubscriptionGateway::new(Provider::Stripe)
                .failing_with(PaymentError::new(PaymentErrorCode::NetworkError, "timeout")),
        );
        let handler = CancelSubscriptionHandler::new(
            Arc::new(store.clone()),
            SubscriptionGateways::new().with(gateway),
        );

        let err = handler.handle(command(true)).await.unwrap_err();

        assert!(matches!(err, SubscriptionError::Provider(_)));
        let stored = store.subscription_by_provider_id("sub_1").await.unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn no_live_subscription_is_not_found() {
        let handler = CancelSubscriptionHandler::new(
            Arc::new(InMemoryBillingStore::new()),
            SubscriptionGateways::new(),
        );

        let err = handler.handle(command(true)).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::NotFound(_)));
    }
}
