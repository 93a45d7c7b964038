//! ResumeSubscriptionHandler - undo a scheduled cancellation.

use std::sync::Arc;

use crate::domain::billing::{Subscription, SubscriptionError};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{SubscriptionGateways, SubscriptionRepository};

#[derive(Debug, Clone)]
pub struct ResumeSubscriptionCommand {
    pub user_id: UserId,
}

pub struct ResumeSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    gateways: SubscriptionGateways,
}

impl ResumeSubscriptionHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>, gateways: SubscriptionGateways) -> Self {
        Self {
            subscriptions,
            gateways,
        }
    }

    pub async fn handle(&self, cmd: ResumeSubscriptionCommand) -> Result<Subscription, SubscriptionError> {
        let mut subscription = self
            .subscriptions
            .find_active_by_user_id(&cmd.user_id)
            .await?
            .ok_or_else(|| SubscriptionError::NotFound(format!("user {}", cmd.user_id)))?;

        if !subscription.cancel_at_period_end {
            return Err(SubscriptionError::InvalidState(
                "Subscription is not scheduled for cancellation".to_string(),
            ));
        }

        let gateway = self.gateways.get(subscription.provider).ok_or_else(|| {
            SubscriptionError::Provider(format!(
                "No gateway registered for {}",
                subscription.provider
            ))
        })?;
        gateway
            .resume_subscription(&subscription.provider_subscription_id)
            .await
            .map_err(|e| SubscriptionError::Provider(e.to_string()))?;

        subscription.resume(Timestamp::now())?;
        self.subscriptions.update(&subscription).await?;

        tracing::info!(subscription_id = %subscription.id, "Subscription resumed");
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::adapters::payment::MockSubscriptionGateway;
    use crate::domain::billing::{NewSubscription, Provider, SubscriptionStatus};
    use crate::domain::foundation::PlanId;
    use std::collections::HashMap;

    async fn store_with(cancel_at_period_end: bool) -> InMemoryBillingStore {
        let mut subscription = Subscription::create(
            NewSubscription {
                user_id: UserId::new("user-1").unwrap(),
                plan_id: PlanId::new("pro_monthly").unwrap(),
                provider: Provider::Paypal,
                provider_subscription_id: "I-123".to_string(),
                provider_customer_id: "payer-1".to_string(),
                status: SubscriptionStatus::Active,
                current_period_start: None,
                current_period_end: None,
                trial_end: None,
                metadata: HashMap::new(),
            },
            Timestamp::now(),
        );
        subscription.cancel_at_period_end = cancel_at_period_end;
        let store = InMemoryBillingStore::new();
        store.insert_subscription(subscription).await;
        store
    }

    #[tokio::test]
    async fn resumes_scheduled_cancellation() {
        let store = store_with(true).await;
        let gateway = Arc::new(MockSubscriptionGateway::new(Provider::Paypal));
        let handler = ResumeSubscriptionHandler::new(
            Arc::new(store.clone()),
            SubscriptionGateways::new().with(gateway.clone()),
        );

        let subscription = handler
            .handle(ResumeSubscriptionCommand {
                user_id: UserId::new("user-1").unwrap(),
            })
            .await
            .unwrap();

        assert!(!subscription.cancel_at_period_end);
        assert_eq!(gateway.resume_calls(), vec!["I-123".to_string()]);
        assert!(!store.subscription_by_provider_id("I-123").await.unwrap().cancel_at_period_end);
    }

    #[tokio::test]
    async fn rejects_when_nothing_scheduled() {
        let store = store_with(false).await;
        let gateway = Arc::new(MockSubscriptionGateway::new(Provider::Paypal));
        let handler = ResumeSubscriptionHandler::new(
            Arc::new(store),
            SubscriptionGateways::new().with(gateway.clone()),
        );

        let err = handler
            .handle(ResumeSubscriptionCommand {
                user_id: UserId::new("user-1").unwrap(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SubscriptionError::InvalidState(_)));
        assert!(gateway.resume_calls().is_empty());
    }
}
