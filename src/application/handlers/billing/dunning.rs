//! DunningManager - payment failure/success handling and the grace-period sweep.
//!
//! Every status change goes through the lifecycle state machine via the
//! `Subscription` aggregate. Repeated calls are no-ops: a subscription that
//! is already past_due (or already active) is reported as processed without
//! being touched, so retried webhooks and concurrent sweeps converge.

use serde::Serialize;
use std::sync::Arc;

use crate::domain::billing::{
    DunningError, GracePeriodStatus, Provider, SubscriptionStatus, DEFAULT_GRACE_PERIOD_DAYS,
};
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp};
use crate::ports::{SubscriptionGateways, SubscriptionRepository};

/// Outcome of a payment failure or success notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentTransitionResult {
    pub processed: bool,
    pub previous_status: Option<SubscriptionStatus>,
    pub new_status: Option<SubscriptionStatus>,
    pub message: String,
}

pub type PaymentFailureResult = PaymentTransitionResult;
pub type PaymentSuccessResult = PaymentTransitionResult;

impl PaymentTransitionResult {
    fn not_found(provider: Provider, provider_subscription_id: &str) -> Self {
        Self {
            processed: false,
            previous_status: None,
            new_status: None,
            message: format!(
                "Subscription {} not found for provider {}",
                provider_subscription_id, provider
            ),
        }
    }

    fn unchanged(status: SubscriptionStatus, message: impl Into<String>) -> Self {
        Self {
            processed: true,
            previous_status: Some(status),
            new_status: Some(status),
            message: message.into(),
        }
    }

    fn rejected(status: SubscriptionStatus, message: impl Into<String>) -> Self {
        Self {
            processed: false,
            previous_status: Some(status),
            new_status: Some(status),
            message: message.into(),
        }
    }

    fn transitioned(from: SubscriptionStatus, to: SubscriptionStatus) -> Self {
        Self {
            processed: true,
            previous_status: Some(from),
            new_status: Some(to),
            message: format!("Subscription moved from {} to {}", from, to),
        }
    }
}

/// Counts from one grace-period sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GracePeriodExpiryResult {
    pub checked: usize,
    pub canceled: usize,
    pub still_in_grace_period: usize,
    pub canceled_ids: Vec<SubscriptionId>,
}

/// Applies a failed payment to the subscription found in `repo`.
///
/// Shared by the dunning manager and the webhook handlers so both go through
/// the same lifecycle gate.
pub(crate) async fn apply_payment_failure(
    repo: &dyn SubscriptionRepository,
    provider: Provider,
    provider_subscription_id: &str,
    now: Timestamp,
) -> Result<PaymentFailureResult, DomainError> {
    let Some(mut subscription) = repo
        .find_by_provider_subscription_id(provider, provider_subscription_id)
        .await?
    else {
        return Ok(PaymentTransitionResult::not_found(provider, provider_subscription_id));
    };

    let previous = subscription.status;
    if previous == SubscriptionStatus::PastDue {
        return Ok(PaymentTransitionResult::unchanged(
            previous,
            "Subscription already past_due",
        ));
    }

    match subscription.record_payment_failure(now) {
        Ok(()) => {}
        Err(e) if e.code == ErrorCode::InvalidStateTransition => {
            tracing::warn!(
                subscription_id = %subscription.id,
                status = %previous,
                "Payment failure rejected by lifecycle"
            );
            return Ok(PaymentTransitionResult::rejected(previous, e.message));
        }
        Err(e) => return Err(e),
    }

    repo.update(&subscription).await?;
    tracing::info!(
        subscription_id = %subscription.id,
        provider = %provider,
        from = %previous,
        "Subscription entered dunning"
    );
    Ok(PaymentTransitionResult::transitioned(previous, subscription.status))
}

/// Applies a successful payment to the subscription found in `repo`.
pub(crate) async fn apply_payment_success(
    repo: &dyn SubscriptionRepository,
    provider: Provider,
    provider_subscription_id: &str,
    now: Timestamp,
) -> Result<PaymentSuccessResult, DomainError> {
    let Some(mut subscription) = repo
        .find_by_provider_subscription_id(provider, provider_subscription_id)
        .await?
    else {
        return Ok(PaymentTransitionResult::not_found(provider, provider_subscription_id));
    };

    let previous = subscription.status;
    if previous == SubscriptionStatus::Active {
        return Ok(PaymentTransitionResult::unchanged(
            previous,
            "Subscription already active",
        ));
    }

    match subscription.record_payment_success(now) {
        Ok(()) => {}
        Err(e) if e.code == ErrorCode::InvalidStateTransition => {
            tracing::warn!(
                subscription_id = %subscription.id,
                status = %previous,
                "Payment success rejected by lifecycle"
            );
            return Ok(PaymentTransitionResult::rejected(previous, e.message));
        }
        Err(e) => return Err(e),
    }

    repo.update(&subscription).await?;
    tracing::info!(
        subscription_id = %subscription.id,
        provider = %provider,
        from = %previous,
        "Subscription recovered from dunning"
    );
    Ok(PaymentTransitionResult::transitioned(previous, subscription.status))
}

/// Reacts to failed and recovered payments and cancels subscriptions whose
/// grace period has run out.
pub struct DunningManager {
    subscriptions: Arc<dyn SubscriptionRepository>,
    gateways: SubscriptionGateways,
    grace_period_days: u32,
}

impl DunningManager {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>, gateways: SubscriptionGateways) -> Self {
        Self {
            subscriptions,
            gateways,
            grace_period_days: DEFAULT_GRACE_PERIOD_DAYS,
        }
    }

    pub fn with_grace_period_days(mut self, days: u32) -> Self {
        self.grace_period_days = days;
        self
    }

    pub fn grace_period_days(&self) -> u32 {
        self.grace_period_days
    }

    pub async fn handle_payment_failure(
        &self,
        provider_subscription_id: &str,
        provider: Provider,
    ) -> Result<PaymentFailureResult, DunningError> {
        Ok(apply_payment_failure(
            self.subscriptions.as_ref(),
            provider,
            provider_subscription_id,
            Timestamp::now(),
        )
        .await?)
    }

    pub async fn handle_payment_success(
        &self,
        provider_subscription_id: &str,
        provider: Provider,
    ) -> Result<PaymentSuccessResult, DunningError> {
        Ok(apply_payment_success(
            self.subscriptions.as_ref(),
            provider,
            provider_subscription_id,
            Timestamp::now(),
        )
        .await?)
    }

    /// Sweep with the configured grace period at the current time.
    pub async fn run_grace_period_sweep(&self) -> Result<GracePeriodExpiryResult, DunningError> {
        self.process_grace_period_expiry(self.grace_period_days, Timestamp::now())
            .await
    }

    /// Cancels every past_due subscription whose grace period expired by `now`.
    ///
    /// The provider cancel is best effort: "already canceled" is expected and
    /// other provider failures are logged without blocking the local cancel.
    /// A failed local write is logged and the sweep moves on; the next run
    /// picks the subscription up again. The local cancel is written only
    /// while the row is still past_due, so a payment that lands mid-sweep
    /// keeps the subscription active.
    ///
    /// # Errors
    ///
    /// Only when the past_due listing itself fails.
    pub async fn process_grace_period_expiry(
        &self,
        grace_period_days: u32,
        now: Timestamp,
    ) -> Result<GracePeriodExpiryResult, DunningError> {
        let past_due = self.subscriptions.find_past_due().await?;
        let mut result = GracePeriodExpiryResult {
            checked: past_due.len(),
            ..Default::default()
        };

        for mut subscription in past_due {
            let grace = GracePeriodStatus::evaluate(&subscription, grace_period_days, now);
            if !grace.expired {
                result.still_in_grace_period += 1;
                continue;
            }

            // Skip rows a payment recovered since the listing.
            match self.subscriptions.find_by_id(&subscription.id).await {
                Ok(Some(current)) if current.status == SubscriptionStatus::PastDue => {
                    if !GracePeriodStatus::evaluate(&current, grace_period_days, now).expired {
                        result.still_in_grace_period += 1;
                        continue;
                    }
                    subscription = current;
                }
                Ok(_) => {
                    tracing::info!(
                        subscription_id = %subscription.id,
                        "Subscription left past_due during sweep, skipping"
                    );
                    continue;
                }
                Err(e) => {
                    tracing::error!(
                        subscription_id = %subscription.id,
                        error = %e,
                        "Failed to reload subscription for grace period cancellation"
                    );
                    continue;
                }
            }

            self.cancel_at_provider(subscription.provider, &subscription.provider_subscription_id)
                .await;

            if let Err(e) = subscription.expire_grace_period(now) {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    error = %e,
                    "Grace period expiry rejected by lifecycle"
                );
                continue;
            }

            match self
                .subscriptions
                .update_if_status(&subscription, SubscriptionStatus::PastDue)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(
                        subscription_id = %subscription.id,
                        "Subscription recovered while canceling at provider, local state kept"
                    );
                    continue;
                }
                Err(e) => {
                    tracing::error!(
                        subscription_id = %subscription.id,
                        error = %e,
                        "Failed to persist grace period cancellation"
                    );
                    continue;
                }
            }

            result.canceled += 1;
            result.canceled_ids.push(subscription.id);
        }

        tracing::info!(
            checked = result.checked,
            canceled = result.canceled,
            still_in_grace_period = result.still_in_grace_period,
            grace_period_days,
            "Grace period sweep finished"
        );
        Ok(result)
    }

    async fn cancel_at_provider(&self, provider: Provider, provider_subscription_id: &str) {
        let Some(gateway) = self.gateways.get(provider) else {
            tracing::warn!(
                provider = %provider,
                provider_subscription_id,
                "No gateway registered, canceling locally only"
            );
            return;
        };

        match gateway.cancel_subscription(provider_subscription_id, true).await {
            Ok(()) => {}
            Err(e) if e.is_already_canceled() => {
                tracing::debug!(provider_subscription_id, "Provider already canceled subscription");
            }
            Err(e) => {
                tracing::warn!(
                    provider = %provider,
                    provider_subscription_id,
                    error = %e,
                    "Provider cancel failed, canceling locally anyway"
                );
            }
        }
    }
}
