//! Webhook error types.
//!
//! Defines all error conditions that can occur during webhook processing,
//! with HTTP status code mapping and retryability semantics.

use http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::DomainError;

/// Errors that occur during webhook processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Webhook signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signed timestamp is outside the replay window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Failed to parse webhook payload or signature header.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// `(provider, event id)` is already in the ledger. Callers treat this as
    /// a successful no-op.
    #[error("Event {event_id} already processed")]
    AlreadyProcessed { event_id: String },

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Unexpected failure while handling the event.
    #[error("Processing error: {0}")]
    Processing(String),
}

impl WebhookError {
    pub fn already_processed(event_id: impl Into<String>) -> Self {
        WebhookError::AlreadyProcessed {
            event_id: event_id.into(),
        }
    }

    /// Returns true if the provider should redeliver this webhook.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WebhookError::Database(_) | WebhookError::Processing(_))
    }

    /// Returns true for the expected duplicate-delivery outcome.
    pub fn is_already_processed(&self) -> bool {
        matches!(self, WebhookError::AlreadyProcessed { .. })
    }

    /// Maps the error to an appropriate HTTP status code.
    ///
    /// - 2xx: acknowledged, no retry
    /// - 4xx: client error, no retry
    /// - 5xx: server error, provider retries
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature | WebhookError::TimestampOutOfRange => {
                StatusCode::UNAUTHORIZED
            }
            WebhookError::ParseError(_) => StatusCode::BAD_REQUEST,
            WebhookError::AlreadyProcessed { .. } => StatusCode::OK,
            WebhookError::Database(_) | WebhookError::Processing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        use crate::domain::foundation::ErrorCode;

        match err.code {
            ErrorCode::DatabaseError => WebhookError::Database(err.message),
            _ => WebhookError::Processing(err.to_string()),
        }
    }
}
