//! Mock subscription gateway for testing.
//!
//! Records every outbound call and can be configured to fail.

use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};

use crate::domain::billing::Provider;
use crate::ports::{PaymentError, SubscriptionGateway};

/// Mock gateway for tests and local runs without provider credentials.
///
/// # Example
///
/// ```ignore
/// let gateway = Arc::new(
///     MockSubscriptionGateway::new(Provider::Stripe)
///         .failing_with(PaymentError::already_canceled("sub_1")),
/// );
/// ```
pub struct MockSubscriptionGateway {
    provider: Provider,
    error: Option<PaymentError>,
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    cancel_calls: Vec<(String, bool)>,
    resume_calls: Vec<String>,
}

impl MockSubscriptionGateway {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            error: None,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Every call returns `error`. Calls are still recorded.
    pub fn failing_with(mut self, error: PaymentError) -> Self {
        self.error = Some(error);
        self
    }

    /// `(provider_subscription_id, immediate)` per cancel call.
    pub fn cancel_calls(&self) -> Vec<(String, bool)> {
        self.state().cancel_calls.clone()
    }

    pub fn resume_calls(&self) -> Vec<String> {
        self.state().resume_calls.clone()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn outcome(&self) -> Result<(), PaymentError> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SubscriptionGateway for MockSubscriptionGateway {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        immediate: bool,
    ) -> Result<(), PaymentError> {
        self.state()
            .cancel_calls
            .push((provider_subscription_id.to_string(), immediate));
        tracing::debug!(
            provider = %self.provider,
            provider_subscription_id,
            immediate,
            "Mock gateway cancel"
        );
        self.outcome()
    }

    async fn resume_subscription(&self, provider_subscription_id: &str) -> Result<(), PaymentError> {
        self.state()
            .resume_calls
            .push(provider_subscription_id.to_string());
        self.outcome()
    }
}
