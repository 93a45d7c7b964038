//! Subscription aggregate entity.
//!
//! A Subscription ties a user to a catalog plan at one payment provider.
//! Subscriptions are never physically deleted; canceled rows stay for
//! audit and invoice history.
//!
//! # Design Decisions
//!
//! - **One live subscription per user**: enforced when creating, by rejecting
//!   a new record while a trialing/active/past_due one exists
//! - **Lifecycle-gated dunning**: payment failure/success and grace expiry
//!   go through [`LifecycleState`] edges, never direct status writes
//! - **Provider sync**: `subscription.updated`/`canceled` webhooks copy the
//!   provider's normalized status, since the provider is the source of truth

use crate::domain::foundation::{
    DomainError, ErrorCode, PlanId, StateMachine, SubscriptionId, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{LifecycleEvent, LifecycleState, Provider, SubscriptionStatus};

/// Dunning bookkeeping carried while a subscription is past due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DunningInfo {
    /// When the subscription first entered past_due.
    pub started_at: Timestamp,

    /// Most recent failed payment attempt.
    pub last_failure_at: Timestamp,
}

/// Why a subscription ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    GracePeriodExpired,
    UserRequested,
    ProviderCanceled,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::GracePeriodExpired => "grace_period_expired",
            CancelReason::UserRequested => "user_requested",
            CancelReason::ProviderCanceled => "provider_canceled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "grace_period_expired" => Some(CancelReason::GracePeriodExpired),
            "user_requested" => Some(CancelReason::UserRequested),
            "provider_canceled" => Some(CancelReason::ProviderCanceled),
            _ => None,
        }
    }
}

/// Fields required to open a subscription record.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub provider: Provider,
    pub provider_subscription_id: String,
    pub provider_customer_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    pub trial_end: Option<Timestamp>,
    pub metadata: HashMap<String, String>,
}

/// Subscription aggregate.
///
/// # Invariants
///
/// - `(provider, provider_subscription_id)` is unique
/// - `dunning` is `Some` only while status is past_due
/// - `canceled_at` is set once status reaches canceled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub provider: Provider,
    pub provider_subscription_id: String,
    pub provider_customer_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<Timestamp>,
    pub trial_end: Option<Timestamp>,
    pub dunning: Option<DunningInfo>,
    pub cancel_reason: Option<CancelReason>,

    /// Provider-supplied metadata (e.g. checkout `user_id`/`plan_id`).
    pub metadata: HashMap<String, String>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Opens a new subscription record.
    pub fn create(new: NewSubscription, now: Timestamp) -> Self {
        Self {
            id: SubscriptionId::new(),
            user_id: new.user_id,
            plan_id: new.plan_id,
            provider: new.provider,
            provider_subscription_id: new.provider_subscription_id,
            provider_customer_id: new.provider_customer_id,
            status: new.status,
            current_period_start: new.current_period_start,
            current_period_end: new.current_period_end,
            cancel_at_period_end: false,
            canceled_at: None,
            trial_end: new.trial_end,
            dunning: None,
            cancel_reason: None,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Current position in the lifecycle, if the status is lifecycle-managed.
    pub fn lifecycle_state(&self) -> Result<LifecycleState, DomainError> {
        LifecycleState::try_from(self.status)
            .map_err(|e| DomainError::new(ErrorCode::InvalidStateTransition, e.to_string()))
    }

    /// Payment failed: trialing uses `trial_end_payment_failure`, every other
    /// state `payment_failure`. Starts dunning on success.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` when the lifecycle rejects the event.
    pub fn record_payment_failure(&mut self, now: Timestamp) -> Result<(), DomainError> {
        let state = self.lifecycle_state()?;
        let event = if state == LifecycleState::Trialing {
            LifecycleEvent::TrialEndPaymentFailure
        } else {
            LifecycleEvent::PaymentFailure
        };
        self.apply(state, event, now)?;
        self.dunning = Some(DunningInfo {
            started_at: now,
            last_failure_at: now,
        });
        Ok(())
    }

    /// Payment succeeded: `payment_success` back to active, clearing dunning.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` when the lifecycle rejects the event.
    pub fn record_payment_success(&mut self, now: Timestamp) -> Result<(), DomainError> {
        let state = self.lifecycle_state()?;
        self.apply(state, LifecycleEvent::PaymentSuccess, now)?;
        self.dunning = None;
        Ok(())
    }

    /// Grace period ran out while past due.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` unless the subscription is past due.
    pub fn expire_grace_period(&mut self, now: Timestamp) -> Result<(), DomainError> {
        let state = self.lifecycle_state()?;
        self.apply(state, LifecycleEvent::GracePeriodExpire, now)?;
        self.dunning = None;
        self.canceled_at = Some(now);
        self.cancel_reason = Some(CancelReason::GracePeriodExpired);
        Ok(())
    }

    /// User-requested immediate cancellation.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` when already canceled or not lifecycle-managed.
    pub fn cancel_immediately(&mut self, now: Timestamp) -> Result<(), DomainError> {
        let state = self.lifecycle_state()?;
        self.apply(state, LifecycleEvent::CancelImmediate, now)?;
        self.dunning = None;
        self.canceled_at = Some(now);
        self.cancel_reason = Some(CancelReason::UserRequested);
        Ok(())
    }

    /// Flags the subscription to end at the current period end. The status
    /// stays put until the provider reports the cancellation.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` when the lifecycle has no `cancel_request`
    /// edge from the current state.
    pub fn schedule_cancellation(&mut self, now: Timestamp) -> Result<(), DomainError> {
        let state = self.lifecycle_state()?;
        if !state.transition(LifecycleEvent::CancelRequest).valid {
            return Err(invalid_transition(state, LifecycleEvent::CancelRequest));
        }
        self.cancel_at_period_end = true;
        self.updated_at = now;
        Ok(())
    }

    /// Clears a scheduled cancellation.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` when the subscription already ended.
    pub fn resume(&mut self, now: Timestamp) -> Result<(), DomainError> {
        if self.status == SubscriptionStatus::Canceled {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                "Cannot resume a canceled subscription",
            ));
        }
        self.cancel_at_period_end = false;
        self.updated_at = now;
        Ok(())
    }

    /// Copies provider-reported state onto the record.
    pub fn sync_from_provider(
        &mut self,
        status: Option<SubscriptionStatus>,
        period_start: Option<Timestamp>,
        period_end: Option<Timestamp>,
        cancel_at_period_end: Option<bool>,
        now: Timestamp,
    ) {
        if let Some(status) = status {
            if status != SubscriptionStatus::PastDue {
                self.dunning = None;
            }
            if status == SubscriptionStatus::Canceled && self.canceled_at.is_none() {
                self.canceled_at = Some(now);
            }
            self.status = status;
        }
        if period_start.is_some() {
            self.current_period_start = period_start;
        }
        if period_end.is_some() {
            self.current_period_end = period_end;
        }
        if let Some(flag) = cancel_at_period_end {
            self.cancel_at_period_end = flag;
        }
        self.updated_at = now;
    }

    /// Provider reported the subscription as ended.
    pub fn mark_canceled(&mut self, canceled_at: Timestamp, now: Timestamp) {
        self.status = SubscriptionStatus::Canceled;
        self.canceled_at = Some(canceled_at);
        self.cancel_reason.get_or_insert(CancelReason::ProviderCanceled);
        self.dunning = None;
        self.updated_at = now;
    }

    fn apply(
        &mut self,
        state: LifecycleState,
        event: LifecycleEvent,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        let result = state.transition(event);
        if !result.valid {
            return Err(invalid_transition(state, event));
        }
        self.status = result.state.into();
        self.updated_at = now;
        Ok(())
    }
}

fn invalid_transition(state: LifecycleState, event: LifecycleEvent) -> DomainError {
    DomainError::new(
        ErrorCode::InvalidStateTransition,
        format!("Event {:?} is not allowed from {}", event, state),
    )
    .with_detail("from", state.to_string())
}
