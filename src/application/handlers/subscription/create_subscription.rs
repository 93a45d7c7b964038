//! CreateSubscriptionHandler - Command handler for opening subscriptions.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::billing::{
    CustomerMapping, NewSubscription, Provider, Subscription, SubscriptionError,
    SubscriptionStatus,
};
use crate::domain::foundation::{PlanId, Timestamp, UserId};
use crate::ports::{CustomerMappingRepository, PlanRepository, SubscriptionRepository};

/// Command to record a subscription created at checkout.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionCommand {
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub provider: Provider,
    pub provider_subscription_id: String,
    pub provider_customer_id: String,
    pub status: SubscriptionStatus,
    pub trial_end: Option<Timestamp>,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct CreateSubscriptionResult {
    pub subscription: Subscription,
    pub customer_mapping_created: bool,
}

/// Handler for opening subscriptions.
///
/// A user holds at most one live (trialing, active or past_due)
/// subscription; creation is rejected while one exists.
pub struct CreateSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanRepository>,
    customer_mappings: Arc<dyn CustomerMappingRepository>,
}

impl CreateSubscriptionHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        plans: Arc<dyn PlanRepository>,
        customer_mappings: Arc<dyn CustomerMappingRepository>,
    ) -> Self {
        Self {
            subscriptions,
            plans,
            customer_mappings,
        }
    }

    pub async fn handle(
        &self,
        cmd: CreateSubscriptionCommand,
    ) -> Result<CreateSubscriptionResult, SubscriptionError> {
        // 1. Plan must exist and be on sale
        let plan = self
            .plans
            .find_by_id(&cmd.plan_id)
            .await?
            .ok_or_else(|| SubscriptionError::PlanNotFound(cmd.plan_id.clone()))?;
        if !plan.is_active {
            return Err(SubscriptionError::PlanInactive(plan.id));
        }

        // 2. One live subscription per user
        if self
            .subscriptions
            .find_active_by_user_id(&cmd.user_id)
            .await?
            .is_some()
        {
            return Err(SubscriptionError::AlreadyActive(cmd.user_id));
        }

        // 3. Persist
        let now = Timestamp::now();
        let subscription = Subscription::create(
            NewSubscription {
                user_id: cmd.user_id.clone(),
                plan_id: cmd.plan_id,
                provider: cmd.provider,
                provider_subscription_id: cmd.provider_subscription_id,
                provider_customer_id: cmd.provider_customer_id.clone(),
                status: cmd.status,
                current_period_start: cmd.current_period_start,
                current_period_end: cmd.current_period_end,
                trial_end: cmd.trial_end,
                metadata: cmd.metadata,
            },
            now,
        );
        self.subscriptions.create(&subscription).await?;

        // 4. Remember which user the provider customer belongs to
        let customer_mapping_created = match self
            .customer_mappings
            .find_by_provider_customer_id(cmd.provider, &cmd.provider_customer_id)
            .await?
        {
            Some(_) => false,
            None => {
                let mapping =
                    CustomerMapping::new(cmd.user_id, cmd.provider, cmd.provider_customer_id);
                self.customer_mappings.create(&mapping).await?;
                true
            }
        };

        tracing::info!(
            subscription_id = %subscription.id,
            user_id = %subscription.user_id,
            plan_id = %subscription.plan_id,
            provider = %subscription.provider,
            "Subscription created"
        );

        Ok(CreateSubscriptionResult {
            subscription,
            customer_mapping_created,
        })
    }
}
