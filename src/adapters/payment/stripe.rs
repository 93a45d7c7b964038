//! Stripe webhook adapter.
//!
//! Verifies the `Stripe-Signature` header and normalizes Stripe events into
//! [`NormalizedWebhookEvent`]s.
//!
//! # Security
//!
//! - HMAC-SHA256 signature verification with constant-time comparison
//! - Timestamp validation (5-minute window) for replay attack prevention
//! - Secret handled via `secrecy::SecretString`
//!
//! # Event mapping
//!
//! | Stripe | Canonical |
//! |--------|-----------|
//! | customer.subscription.created | subscription.created |
//! | customer.subscription.updated | subscription.updated |
//! | customer.subscription.deleted | subscription.canceled |
//! | invoice.paid, invoice.payment_succeeded | invoice.paid |
//! | invoice.payment_failed | invoice.payment_failed |
//! | charge.refunded | refund.created |
//! | charge.dispute.created | chargeback.created |

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;

use crate::domain::billing::{
    NormalizedWebhookEvent, Provider, SubscriptionStatus, WebhookError, WebhookEventData,
    WebhookEventType,
};
use crate::domain::foundation::Timestamp;
use crate::ports::ProviderWebhookAdapter;

use super::signature::{hmac_sha256, signatures_match, TimestampedSignature};

/// Maximum age for webhook events (5 minutes).
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Clock skew tolerance for future timestamps (60 seconds).
const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

/// Stripe webhook configuration.
#[derive(Clone)]
pub struct StripeWebhookConfig {
    /// Webhook signing secret (whsec_...).
    webhook_secret: SecretString,

    /// Maximum accepted event age in seconds.
    tolerance_secs: i64,
}

impl StripeWebhookConfig {
    pub fn new(webhook_secret: SecretString) -> Self {
        Self {
            webhook_secret,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    pub fn with_tolerance_secs(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }
}

impl std::fmt::Debug for StripeWebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeWebhookConfig")
            .field("webhook_secret", &"[REDACTED]")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

pub struct StripeWebhookAdapter {
    config: StripeWebhookConfig,
}

impl StripeWebhookAdapter {
    pub fn new(config: StripeWebhookConfig) -> Self {
        Self { config }
    }

    /// Full verification against an explicit clock.
    ///
    /// # Errors
    ///
    /// - `ParseError` for a malformed header
    /// - `TimestampOutOfRange` outside the replay window
    /// - `InvalidSignature` when no `v1` signature matches
    pub fn verify(&self, payload: &[u8], header: &str, now: Timestamp) -> Result<(), WebhookError> {
        let header =
            TimestampedSignature::parse(header).map_err(|e| WebhookError::ParseError(e.to_string()))?;

        // 1. Validate timestamp (prevent replay attacks)
        let age = now.as_unix_secs() - header.timestamp;
        if age > self.config.tolerance_secs {
            tracing::warn!(
                event_timestamp = header.timestamp,
                age_secs = age,
                "Webhook event too old - possible replay attack"
            );
            return Err(WebhookError::TimestampOutOfRange);
        }
        if age < -MAX_FUTURE_TOLERANCE_SECS {
            tracing::warn!(
                event_timestamp = header.timestamp,
                "Webhook event from future - clock skew or manipulation"
            );
            return Err(WebhookError::TimestampOutOfRange);
        }

        // 2. Compute expected signature over "<t>.<payload>"
        let mut signed_payload = format!("{}.", header.timestamp).into_bytes();
        signed_payload.extend_from_slice(payload);
        let expected = hmac_sha256(
            self.config.webhook_secret.expose_secret().as_bytes(),
            &signed_payload,
        )
        .ok_or(WebhookError::InvalidSignature)?;

        // 3. Constant-time comparison against every v1 entry
        if !header
            .signatures
            .iter()
            .any(|provided| signatures_match(&expected, provided))
        {
            tracing::warn!("Invalid Stripe webhook signature");
            return Err(WebhookError::InvalidSignature);
        }
        Ok(())
    }
}

impl ProviderWebhookAdapter for StripeWebhookAdapter {
    fn provider(&self) -> Provider {
        Provider::Stripe
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        self.verify(payload, signature, Timestamp::now()).is_ok()
    }

    fn parse_webhook_event(
        &self,
        payload: &[u8],
        _signature: &str,
    ) -> Result<NormalizedWebhookEvent, WebhookError> {
        let event: StripeEvent = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::ParseError(format!("Invalid Stripe event: {}", e)))?;
        let object = event.data.object;

        let (event_type, data) = match event.event_type.as_str() {
            "customer.subscription.created" => (
                WebhookEventType::SubscriptionCreated,
                subscription_data(&object)?,
            ),
            "customer.subscription.updated" => (
                WebhookEventType::SubscriptionUpdated,
                subscription_data(&object)?,
            ),
            "customer.subscription.deleted" => (
                WebhookEventType::SubscriptionCanceled,
                subscription_data(&object)?,
            ),
            "invoice.paid" | "invoice.payment_succeeded" => {
                (WebhookEventType::InvoicePaid, invoice_data(&object, true)?)
            }
            "invoice.payment_failed" => (
                WebhookEventType::InvoicePaymentFailed,
                invoice_data(&object, false)?,
            ),
            "charge.refunded" => (WebhookEventType::RefundCreated, charge_data(&object)?),
            "charge.dispute.created" => (WebhookEventType::ChargebackCreated, charge_data(&object)?),
            other => (
                WebhookEventType::Unknown(other.to_string()),
                WebhookEventData {
                    raw: object.clone(),
                    ..Default::default()
                },
            ),
        };

        Ok(NormalizedWebhookEvent {
            id: event.id,
            event_type,
            data,
            created_at: Timestamp::from_unix_secs(event.created).unwrap_or_else(Timestamp::now),
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Stripe payload shapes
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct StripeEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct StripeSubscriptionObject {
    id: String,
    customer: Option<String>,
    status: Option<String>,
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
    cancel_at_period_end: Option<bool>,
    canceled_at: Option<i64>,
    trial_end: Option<i64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct StripeInvoiceObject {
    id: String,
    customer: Option<String>,
    subscription: Option<String>,
    amount_paid: Option<i64>,
    amount_due: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct StripeChargeObject {
    id: String,
    customer: Option<String>,
    invoice: Option<String>,
    amount: Option<i64>,
    amount_refunded: Option<i64>,
    currency: Option<String>,
}

fn decode<T: serde::de::DeserializeOwned>(object: &serde_json::Value) -> Result<T, WebhookError> {
    serde_json::from_value(object.clone())
        .map_err(|e| WebhookError::ParseError(format!("Unexpected Stripe object: {}", e)))
}

fn timestamp(secs: Option<i64>) -> Option<Timestamp> {
    secs.and_then(Timestamp::from_unix_secs)
}

/// Stripe's statuses already match the canonical vocabulary.
fn normalize_status(status: Option<&str>) -> Option<SubscriptionStatus> {
    let status = status?;
    match status.parse() {
        Ok(status) => Some(status),
        Err(_) => {
            tracing::warn!(status, "Unrecognised Stripe subscription status");
            None
        }
    }
}

fn subscription_data(object: &serde_json::Value) -> Result<WebhookEventData, WebhookError> {
    let sub: StripeSubscriptionObject = decode(object)?;
    Ok(WebhookEventData {
        subscription_id: Some(sub.id),
        customer_id: sub.customer,
        status: normalize_status(sub.status.as_deref()),
        current_period_start: timestamp(sub.current_period_start),
        current_period_end: timestamp(sub.current_period_end),
        cancel_at_period_end: sub.cancel_at_period_end,
        canceled_at: timestamp(sub.canceled_at),
        trial_end: timestamp(sub.trial_end),
        metadata: sub.metadata,
        raw: object.clone(),
        ..Default::default()
    })
}

fn invoice_data(object: &serde_json::Value, paid: bool) -> Result<WebhookEventData, WebhookError> {
    let invoice: StripeInvoiceObject = decode(object)?;
    Ok(WebhookEventData {
        subscription_id: invoice.subscription,
        customer_id: invoice.customer,
        invoice_id: Some(invoice.id),
        amount_cents: if paid {
            invoice.amount_paid
        } else {
            invoice.amount_due
        },
        currency: invoice.currency,
        metadata: invoice.metadata,
        raw: object.clone(),
        ..Default::default()
    })
}

fn charge_data(object: &serde_json::Value) -> Result<WebhookEventData, WebhookError> {
    let charge: StripeChargeObject = decode(object)?;
    Ok(WebhookEventData {
        customer_id: charge.customer,
        invoice_id: charge.invoice.or(Some(charge.id)),
        amount_cents: charge.amount_refunded.or(charge.amount),
        currency: charge.currency,
        raw: object.clone(),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn adapter() -> StripeWebhookAdapter {
        StripeWebhookAdapter::new(StripeWebhookConfig::new(SecretString::new(SECRET.to_string())))
    }

    fn sign(secret: &str, timestamp: i64, payload: &str) -> String {
        let mac = hmac_sha256(secret.as_bytes(), format!("{}.{}", timestamp, payload).as_bytes())
            .unwrap();
        format!("t={},v1={}", timestamp, hex::encode(mac))
    }

    // ══════════════════════════════════════════════════════════════
    // Signature Verification
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn accepts_valid_signature() {
        let payload = r#"{"id":"evt_1"}"#;
        let now = Timestamp::now();
        let header = sign(SECRET, now.as_unix_secs(), payload);

        assert!(adapter().verify(payload.as_bytes(), &header, now).is_ok());
        assert!(adapter().verify_webhook_signature(payload.as_bytes(), &header));
    }

    #[test]
    fn rejects_wrong_secret() {
        let payload = r#"{"id":"evt_1"}"#;
        let now = Timestamp::now();
        let header = sign("wrong_secret", now.as_unix_secs(), payload);

        assert!(matches!(
            adapter().verify(payload.as_bytes(), &header, now),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_tampered_payload() {
        let now = Timestamp::now();
        let header = sign(SECRET, now.as_unix_secs(), r#"{"amount":100}"#);

        assert!(!adapter().verify_webhook_signature(br#"{"amount":999}"#, &header));
    }

    #[test]
    fn rejects_expired_and_future_timestamps() {
        let payload = r#"{"id":"evt_1"}"#;
        let now = Timestamp::now();

        let old = sign(SECRET, now.as_unix_secs() - 600, payload);
        assert!(matches!(
            adapter().verify(payload.as_bytes(), &old, now),
            Err(WebhookError::TimestampOutOfRange)
        ));

        let future = sign(SECRET, now.as_unix_secs() + 120, payload);
        assert!(matches!(
            adapter().verify(payload.as_bytes(), &future, now),
            Err(WebhookError::TimestampOutOfRange)
        ));

        let slight_skew = sign(SECRET, now.as_unix_secs() + 30, payload);
        assert!(adapter().verify(payload.as_bytes(), &slight_skew, now).is_ok());
    }

    #[test]
    fn accepts_any_matching_v1_during_secret_roll() {
        let payload = r#"{"id":"evt_1"}"#;
        let now = Timestamp::now();
        let good = sign(SECRET, now.as_unix_secs(), payload);
        let stale = sign("old_secret", now.as_unix_secs(), payload);
        let stale_v1 = stale.split_once(",v1=").unwrap().1;
        let header = format!("{},v1={}", good, stale_v1);

        assert!(adapter().verify(payload.as_bytes(), &header, now).is_ok());
    }

    // ══════════════════════════════════════════════════════════════
    // Normalization
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn normalizes_subscription_created() {
        let payload = r#"{
            "id": "evt_sub_created",
            "type": "customer.subscription.created",
            "created": 1704067200,
            "data": {"object": {
                "id": "sub_123",
                "customer": "cus_456",
                "status": "trialing",
                "current_period_start": 1704067200,
                "current_period_end": 1706745600,
                "cancel_at_period_end": false,
                "trial_end": 1705276800,
                "metadata": {"user_id": "user-1", "plan_id": "pro_monthly"}
            }}
        }"#;

        let event = adapter().parse_webhook_event(payload.as_bytes(), "").unwrap();

        assert_eq!(event.id, "evt_sub_created");
        assert_eq!(event.event_type, WebhookEventType::SubscriptionCreated);
        assert_eq!(event.data.subscription_id.as_deref(), Some("sub_123"));
        assert_eq!(event.data.customer_id.as_deref(), Some("cus_456"));
        assert_eq!(event.data.status, Some(SubscriptionStatus::Trialing));
        assert_eq!(event.data.metadata_value("plan_id"), Some("pro_monthly"));
        assert_eq!(event.data.trial_end, Timestamp::from_unix_secs(1705276800));
    }

    #[test]
    fn normalizes_invoice_payment_failed() {
        let payload = r#"{
            "id": "evt_inv_failed",
            "type": "invoice.payment_failed",
            "created": 1704067200,
            "data": {"object": {
                "id": "in_1",
                "customer": "cus_456",
                "subscription": "sub_123",
                "amount_paid": 0,
                "amount_due": 2900,
                "currency": "usd"
            }}
        }"#;

        let event = adapter().parse_webhook_event(payload.as_bytes(), "").unwrap();

        assert_eq!(event.event_type, WebhookEventType::InvoicePaymentFailed);
        assert_eq!(event.data.invoice_id.as_deref(), Some("in_1"));
        assert_eq!(event.data.amount_cents, Some(2900));
    }

    #[test]
    fn unknown_types_pass_through() {
        let payload = r#"{
            "id": "evt_x",
            "type": "customer.tax_id.created",
            "created": 1704067200,
            "data": {"object": {"id": "txi_1"}}
        }"#;

        let event = adapter().parse_webhook_event(payload.as_bytes(), "").unwrap();
        assert_eq!(
            event.event_type,
            WebhookEventType::Unknown("customer.tax_id.created".to_string())
        );
    }

    #[test]
    fn malformed_payload_is_parse_error() {
        let err = adapter().parse_webhook_event(b"not json", "").unwrap_err();
        assert!(matches!(err, WebhookError::ParseError(_)));
    }
}
