//! Subscription lifecycle state machine.
//!
//! A pure mapping from (state, event) to state with no I/O. Every status
//! change made by the dunning manager and the webhook handlers goes
//! through this table.

use crate::domain::foundation::{StateMachine, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::SubscriptionStatus;

/// States the lifecycle machine reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Trialing,
    Active,
    PastDue,
    Canceled,
}

/// Events that drive the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    TrialEndPaymentSuccess,
    TrialEndPaymentFailure,
    PaymentSuccess,
    PaymentFailure,
    CancelRequest,
    CancelImmediate,
    GracePeriodExpire,
}

impl LifecycleState {
    pub const ALL: [LifecycleState; 4] = [
        LifecycleState::Trialing,
        LifecycleState::Active,
        LifecycleState::PastDue,
        LifecycleState::Canceled,
    ];
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 7] = [
        LifecycleEvent::TrialEndPaymentSuccess,
        LifecycleEvent::TrialEndPaymentFailure,
        LifecycleEvent::PaymentSuccess,
        LifecycleEvent::PaymentFailure,
        LifecycleEvent::CancelRequest,
        LifecycleEvent::CancelImmediate,
        LifecycleEvent::GracePeriodExpire,
    ];
}

impl StateMachine for LifecycleState {
    type Event = LifecycleEvent;

    fn edges() -> &'static [(Self, Self::Event, Self)] {
        use LifecycleEvent::*;
        use LifecycleState::*;
        &[
            // From TRIALING
            (Trialing, TrialEndPaymentSuccess, Active),
            (Trialing, PaymentSuccess, Active),
            (Trialing, CancelRequest, Canceled),
            (Trialing, CancelImmediate, Canceled),
            (Trialing, TrialEndPaymentFailure, PastDue),
            // From ACTIVE
            (Active, PaymentFailure, PastDue),
            (Active, CancelRequest, Canceled),
            (Active, CancelImmediate, Canceled),
            // From PAST_DUE
            (PastDue, PaymentSuccess, Active),
            (PastDue, GracePeriodExpire, Canceled),
            (PastDue, CancelImmediate, Canceled),
        ]
    }
}

impl From<LifecycleState> for SubscriptionStatus {
    fn from(state: LifecycleState) -> Self {
        match state {
            LifecycleState::Trialing => SubscriptionStatus::Trialing,
            LifecycleState::Active => SubscriptionStatus::Active,
            LifecycleState::PastDue => SubscriptionStatus::PastDue,
            LifecycleState::Canceled => SubscriptionStatus::Canceled,
        }
    }
}

impl TryFrom<SubscriptionStatus> for LifecycleState {
    type Error = ValidationError;

    fn try_from(status: SubscriptionStatus) -> Result<Self, Self::Error> {
        match status {
            SubscriptionStatus::Trialing => Ok(LifecycleState::Trialing),
            SubscriptionStatus::Active => Ok(LifecycleState::Active),
            SubscriptionStatus::PastDue => Ok(LifecycleState::PastDue),
            SubscriptionStatus::Canceled => Ok(LifecycleState::Canceled),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("'{}' is not managed by the lifecycle", other),
            )),
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(SubscriptionStatus::from(*self).as_str())
    }
}
