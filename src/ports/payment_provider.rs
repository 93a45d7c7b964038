//! Payment provider ports.
//!
//! Provider capabilities are split in two:
//!
//! - [`ProviderWebhookAdapter`] verifies and normalizes inbound webhooks
//! - [`SubscriptionGateway`] performs outbound subscription operations
//!
//! The core engine never branches on provider identity; it asks the
//! registered adapter or gateway for the provider at hand.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::billing::{NormalizedWebhookEvent, Provider, WebhookError};
use crate::domain::foundation::{DomainError, ErrorCode};

/// Inbound webhook capability of one provider.
pub trait ProviderWebhookAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Checks the signature header against the raw payload bytes.
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool;

    /// Normalizes the payload. Assumes the signature was already verified.
    ///
    /// # Errors
    ///
    /// `ParseError` when the payload is not a recognisable event.
    fn parse_webhook_event(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<NormalizedWebhookEvent, WebhookError>;
}

/// Outbound subscription operations of one provider.
#[async_trait]
pub trait SubscriptionGateway: Send + Sync {
    fn provider(&self) -> Provider;

    /// Cancel a subscription.
    ///
    /// If `immediate` is false, the subscription stays active until its
    /// period ends.
    async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        immediate: bool,
    ) -> Result<(), PaymentError>;

    /// Undo a scheduled cancellation.
    async fn resume_subscription(&self, provider_subscription_id: &str)
        -> Result<(), PaymentError>;
}

/// Gateways keyed by provider.
#[derive(Clone, Default)]
pub struct SubscriptionGateways {
    gateways: HashMap<Provider, Arc<dyn SubscriptionGateway>>,
}

impl SubscriptionGateways {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a gateway under its own provider, replacing any previous one.
    pub fn with(mut self, gateway: Arc<dyn SubscriptionGateway>) -> Self {
        self.gateways.insert(gateway.provider(), gateway);
        self
    }

    pub fn get(&self, provider: Provider) -> Option<&Arc<dyn SubscriptionGateway>> {
        self.gateways.get(&provider)
    }
}

impl std::fmt::Debug for SubscriptionGateways {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionGateways")
            .field("providers", &self.gateways.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Payment provider error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentError {
    pub code: PaymentErrorCode,
    pub message: String,
}

impl PaymentError {
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(resource: &str) -> Self {
        Self::new(PaymentErrorCode::NotFound, format!("{} not found", resource))
    }

    /// The provider already considers the subscription canceled.
    pub fn already_canceled(provider_subscription_id: &str) -> Self {
        Self::new(
            PaymentErrorCode::AlreadyCanceled,
            format!("Subscription {} is already canceled", provider_subscription_id),
        )
    }

    pub fn is_already_canceled(&self) -> bool {
        self.code == PaymentErrorCode::AlreadyCanceled
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentError {}

impl From<PaymentError> for DomainError {
    fn from(err: PaymentError) -> Self {
        let code = match err.code {
            PaymentErrorCode::NotFound => ErrorCode::SubscriptionNotFound,
            PaymentErrorCode::AlreadyCanceled => ErrorCode::InvalidStateTransition,
            _ => ErrorCode::ProviderError,
        };

        DomainError::new(code, err.message)
    }
}

/// Payment error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorCode {
    /// Network connectivity issue.
    NetworkError,

    /// API authentication failed.
    AuthenticationError,

    /// Resource not found.
    NotFound,

    /// Subscription already canceled at the provider.
    AlreadyCanceled,

    /// Rate limit exceeded.
    RateLimitExceeded,

    /// Provider API error.
    ProviderError,
}

impl PaymentErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentErrorCode::NetworkError | PaymentErrorCode::RateLimitExceeded
        )
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentErrorCode::NetworkError => "network_error",
            PaymentErrorCode::AuthenticationError => "authentication_error",
            PaymentErrorCode::NotFound => "not_found",
            PaymentErrorCode::AlreadyCanceled => "already_canceled",
            PaymentErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            PaymentErrorCode::ProviderError => "provider_error",
        };
        write!(f, "{}", s)
    }
}
