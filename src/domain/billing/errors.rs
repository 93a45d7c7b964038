//! Billing-specific error types.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | AlreadyActive | 409 |
//! | NotFound | 404 |
//! | PlanNotFound / PlanInactive | 400 |
//! | InvalidState | 409 |
//! | Provider | 502 |
//! | Infrastructure | 500 |

use http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, PlanId, UserId};

/// Errors from subscription commands (create, cancel, resume).
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("User {0} already has an active subscription")]
    AlreadyActive(UserId),

    #[error("Subscription not found: {0}")]
    NotFound(String),

    #[error("Plan not found: {0}")]
    PlanNotFound(PlanId),

    #[error("Plan {0} is not available for new subscriptions")]
    PlanInactive(PlanId),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Infrastructure error: {0}")]
    Infrastructure(DomainError),
}

impl SubscriptionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SubscriptionError::AlreadyActive(_) | SubscriptionError::InvalidState(_) => {
                StatusCode::CONFLICT
            }
            SubscriptionError::NotFound(_) => StatusCode::NOT_FOUND,
            SubscriptionError::PlanNotFound(_) | SubscriptionError::PlanInactive(_) => {
                StatusCode::BAD_REQUEST
            }
            SubscriptionError::Provider(_) => StatusCode::BAD_GATEWAY,
            SubscriptionError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DomainError> for SubscriptionError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::InvalidStateTransition => SubscriptionError::InvalidState(err.message),
            _ => SubscriptionError::Infrastructure(err),
        }
    }
}

/// Errors from the dunning manager. Business outcomes (not found, invalid
/// transition) are reported in result structs, so only storage failures
/// surface here.
#[derive(Debug, Error)]
pub enum DunningError {
    #[error("Repository error: {0}")]
    Repository(#[from] DomainError),
}
