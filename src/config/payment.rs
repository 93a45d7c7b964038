//! Payment provider webhook configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Webhook credentials per provider. A provider is enabled when its
/// secret is present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentConfig {
    /// Stripe webhook signing secret (whsec_...)
    pub stripe_webhook_secret: Option<SecretString>,

    /// PayPal webhook registration id
    pub paypal_webhook_id: Option<String>,

    /// PayPal webhook signing secret
    pub paypal_webhook_secret: Option<SecretString>,
}

impl PaymentConfig {
    pub fn stripe_enabled(&self) -> bool {
        self.stripe_webhook_secret.is_some()
    }

    pub fn paypal_enabled(&self) -> bool {
        self.paypal_webhook_secret.is_some()
    }

    /// Validate payment configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.stripe_enabled() && !self.paypal_enabled() {
            return Err(ValidationError::NoProviderConfigured);
        }

        if let Some(secret) = &self.stripe_webhook_secret {
            if !secret.expose_secret().starts_with("whsec_") {
                return Err(ValidationError::InvalidStripeWebhookSecret);
            }
        }

        if self.paypal_enabled()
            && self
                .paypal_webhook_id
                .as_deref()
                .map_or(true, |id| id.trim().is_empty())
        {
            return Err(ValidationError::MissingRequired("PAYPAL_WEBHOOK_ID"));
        }

        Ok(())
    }
}
