//! Entitlement error types.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::foundation::DomainError;

/// Machine-readable reason attached to a Forbidden error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForbiddenCode {
    FeatureNotEntitled,
    LimitExceeded,
    StorageLimitExceeded,
    SeatLimitExceeded,
}

impl ForbiddenCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForbiddenCode::FeatureNotEntitled => "FEATURE_NOT_ENTITLED",
            ForbiddenCode::LimitExceeded => "LIMIT_EXCEEDED",
            ForbiddenCode::StorageLimitExceeded => "STORAGE_LIMIT_EXCEEDED",
            ForbiddenCode::SeatLimitExceeded => "SEAT_LIMIT_EXCEEDED",
        }
    }
}

impl fmt::Display for ForbiddenCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum EntitlementError {
    /// Caller-facing, recoverable.
    #[error("[{code}] {message}")]
    Forbidden { code: ForbiddenCode, message: String },

    #[error("Infrastructure error: {0}")]
    Infrastructure(#[from] DomainError),
}

impl EntitlementError {
    pub fn forbidden(code: ForbiddenCode, message: impl Into<String>) -> Self {
        EntitlementError::Forbidden {
            code,
            message: message.into(),
        }
    }

    pub fn forbidden_code(&self) -> Option<ForbiddenCode> {
        match self {
            EntitlementError::Forbidden { code, .. } => Some(*code),
            EntitlementError::Infrastructure(_) => None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            EntitlementError::Forbidden { .. } => StatusCode::FORBIDDEN,
            EntitlementError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
