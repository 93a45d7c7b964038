//! Payment provider adapters.
//!
//! - [`StripeWebhookAdapter`] - `t=,v1=` signed Stripe events
//! - [`PaypalWebhookAdapter`] - transmission-signed PayPal events
//! - [`MockSubscriptionGateway`] - outbound gateway double for tests

mod mock;
mod paypal;
mod signature;
mod stripe;

pub use mock::MockSubscriptionGateway;
pub use paypal::{PaypalWebhookAdapter, PaypalWebhookConfig};
pub use signature::{SignatureParseError, TimestampedSignature, TransmissionSignature};
pub use stripe::{StripeWebhookAdapter, StripeWebhookConfig, DEFAULT_TOLERANCE_SECS};

use std::sync::Arc;

use crate::config::PaymentConfig;
use crate::ports::ProviderWebhookAdapter;

/// Webhook adapters for every provider with a configured secret.
pub fn configured_adapters(
    config: &PaymentConfig,
    tolerance_secs: i64,
) -> Vec<Arc<dyn ProviderWebhookAdapter>> {
    let mut adapters: Vec<Arc<dyn ProviderWebhookAdapter>> = Vec::new();

    if let Some(secret) = &config.stripe_webhook_secret {
        adapters.push(Arc::new(StripeWebhookAdapter::new(
            StripeWebhookConfig::new(secret.clone()).with_tolerance_secs(tolerance_secs),
        )));
    }

    if let (Some(webhook_id), Some(secret)) =
        (&config.paypal_webhook_id, &config.paypal_webhook_secret)
    {
        adapters.push(Arc::new(PaypalWebhookAdapter::new(
            PaypalWebhookConfig::new(webhook_id.clone(), secret.clone())
                .with_tolerance_secs(tolerance_secs),
        )));
    }

    adapters
}
