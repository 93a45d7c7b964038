//! Usage metering errors.

use http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::{DomainError, TenantId, ValidationError};

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("Unknown usage metric: {0}")]
    UnknownMetric(String),

    #[error("Usage limit exceeded for '{metric_key}' (tenant {tenant_id}): current {current}, limit {limit}")]
    LimitExceeded {
        metric_key: String,
        tenant_id: TenantId,
        current: i64,
        limit: i64,
    },

    #[error("Invalid usage request: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Infrastructure error: {0}")]
    Infrastructure(#[from] DomainError),
}

impl UsageError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            UsageError::UnknownMetric(_) | UsageError::Invalid(_) => StatusCode::BAD_REQUEST,
            UsageError::LimitExceeded { .. } => StatusCode::FORBIDDEN,
            UsageError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
