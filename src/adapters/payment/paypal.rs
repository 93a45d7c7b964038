//! PayPal webhook adapter.
//!
//! Signature header format:
//! `transmission_id=<id>,transmission_time=<rfc3339>,signature=<hex>` where
//! the signature is HMAC-SHA256 over
//! `<transmission_id>|<transmission_time>|<webhook_id>|<sha256_hex(body)>`.
//!
//! PayPal reports subscription states in its own vocabulary:
//!
//! | PayPal | Canonical |
//! |--------|-----------|
//! | ACTIVE | active |
//! | SUSPENDED | active, cancel_at_period_end |
//! | CANCELLED, EXPIRED | canceled |
//! | APPROVAL_PENDING, APPROVED | incomplete |

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;

use crate::domain::billing::{
    NormalizedWebhookEvent, Provider, SubscriptionStatus, WebhookError, WebhookEventData,
    WebhookEventType,
};
use crate::domain::foundation::Timestamp;
use crate::ports::ProviderWebhookAdapter;

use super::signature::{hmac_sha256, sha256_hex, signatures_match, TransmissionSignature};
use super::stripe::DEFAULT_TOLERANCE_SECS;

const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

#[derive(Clone)]
pub struct PaypalWebhookConfig {
    /// Id of the webhook registration, bound into every signature.
    webhook_id: String,
    webhook_secret: SecretString,
    tolerance_secs: i64,
}

impl PaypalWebhookConfig {
    pub fn new(webhook_id: impl Into<String>, webhook_secret: SecretString) -> Self {
        Self {
            webhook_id: webhook_id.into(),
            webhook_secret,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    pub fn with_tolerance_secs(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }
}

impl std::fmt::Debug for PaypalWebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaypalWebhookConfig")
            .field("webhook_id", &self.webhook_id)
            .field("webhook_secret", &"[REDACTED]")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

pub struct PaypalWebhookAdapter {
    config: PaypalWebhookConfig,
}

impl PaypalWebhookAdapter {
    pub fn new(config: PaypalWebhookConfig) -> Self {
        Self { config }
    }

    /// # Errors
    ///
    /// - `ParseError` for a malformed header or transmission time
    /// - `TimestampOutOfRange` outside the replay window
    /// - `InvalidSignature` on mismatch
    pub fn verify(&self, payload: &[u8], header: &str, now: Timestamp) -> Result<(), WebhookError> {
        let header = TransmissionSignature::parse(header)
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;
        let sent_at = Timestamp::parse_rfc3339(&header.transmission_time).ok_or_else(|| {
            WebhookError::ParseError(format!(
                "Invalid transmission_time '{}'",
                header.transmission_time
            ))
        })?;

        let age = now.as_unix_secs() - sent_at.as_unix_secs();
        if age > self.config.tolerance_secs || age < -MAX_FUTURE_TOLERANCE_SECS {
            tracing::warn!(
                transmission_id = %header.transmission_id,
                age_secs = age,
                "PayPal webhook outside replay window"
            );
            return Err(WebhookError::TimestampOutOfRange);
        }

        let message = format!(
            "{}|{}|{}|{}",
            header.transmission_id,
            header.transmission_time,
            self.config.webhook_id,
            sha256_hex(payload)
        );
        let expected = hmac_sha256(
            self.config.webhook_secret.expose_secret().as_bytes(),
            message.as_bytes(),
        )
        .ok_or(WebhookError::InvalidSignature)?;

        if !signatures_match(&expected, &header.signature) {
            tracing::warn!(
                transmission_id = %header.transmission_id,
                "Invalid PayPal webhook signature"
            );
            return Err(WebhookError::InvalidSignature);
        }
        Ok(())
    }
}

impl ProviderWebhookAdapter for PaypalWebhookAdapter {
    fn provider(&self) -> Provider {
        Provider::Paypal
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        self.verify(payload, signature, Timestamp::now()).is_ok()
    }

    fn parse_webhook_event(
        &self,
        payload: &[u8],
        _signature: &str,
    ) -> Result<NormalizedWebhookEvent, WebhookError> {
        let event: PaypalEvent = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::ParseError(format!("Invalid PayPal event: {}", e)))?;
        let resource = event.resource;

        let (event_type, data) = match event.event_type.as_str() {
            "BILLING.SUBSCRIPTION.CREATED" => (
                WebhookEventType::SubscriptionCreated,
                subscription_data(&resource)?,
            ),
            "BILLING.SUBSCRIPTION.ACTIVATED"
            | "BILLING.SUBSCRIPTION.UPDATED"
            | "BILLING.SUBSCRIPTION.SUSPENDED"
            | "BILLING.SUBSCRIPTION.RE-ACTIVATED" => (
                WebhookEventType::SubscriptionUpdated,
                subscription_data(&resource)?,
            ),
            "BILLING.SUBSCRIPTION.CANCELLED" | "BILLING.SUBSCRIPTION.EXPIRED" => (
                WebhookEventType::SubscriptionCanceled,
                subscription_data(&resource)?,
            ),
            "BILLING.SUBSCRIPTION.PAYMENT.FAILED" => (
                WebhookEventType::InvoicePaymentFailed,
                failed_payment_data(&resource)?,
            ),
            "PAYMENT.SALE.COMPLETED" => (WebhookEventType::InvoicePaid, sale_data(&resource)?),
            "PAYMENT.SALE.REFUNDED" => (WebhookEventType::RefundCreated, sale_data(&resource)?),
            "CUSTOMER.DISPUTE.CREATED" => (
                WebhookEventType::ChargebackCreated,
                dispute_data(&resource)?,
            ),
            other => (
                WebhookEventType::Unknown(other.to_string()),
                WebhookEventData {
                    raw: resource.clone(),
                    ..Default::default()
                },
            ),
        };

        let created_at = event
            .create_time
            .as_deref()
            .and_then(Timestamp::parse_rfc3339)
            .unwrap_or_else(Timestamp::now);

        Ok(NormalizedWebhookEvent {
            id: event.id,
            event_type,
            data,
            created_at,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// PayPal payload shapes
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct PaypalEvent {
    id: String,
    event_type: String,
    create_time: Option<String>,
    resource: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PaypalSubscription {
    id: String,
    status: Option<String>,
    custom_id: Option<String>,
    start_time: Option<String>,
    status_update_time: Option<String>,
    subscriber: Option<PaypalSubscriber>,
    billing_info: Option<PaypalBillingInfo>,
}

#[derive(Debug, Deserialize)]
struct PaypalSubscriber {
    payer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaypalBillingInfo {
    next_billing_time: Option<String>,
    last_payment: Option<PaypalPayment>,
    last_failed_payment: Option<PaypalPayment>,
}

#[derive(Debug, Deserialize)]
struct PaypalPayment {
    amount: Option<PaypalMoney>,
    time: Option<String>,
}

/// PayPal uses `value`/`currency_code` on subscriptions and
/// `total`/`currency` on sales.
#[derive(Debug, Deserialize)]
struct PaypalMoney {
    #[serde(alias = "total")]
    value: String,
    #[serde(alias = "currency")]
    currency_code: String,
}

#[derive(Debug, Deserialize)]
struct PaypalSale {
    id: String,
    billing_agreement_id: Option<String>,
    sale_id: Option<String>,
    amount: Option<PaypalMoney>,
    custom: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaypalDispute {
    dispute_id: String,
    dispute_amount: Option<PaypalMoney>,
}

fn decode<T: serde::de::DeserializeOwned>(resource: &serde_json::Value) -> Result<T, WebhookError> {
    serde_json::from_value(resource.clone())
        .map_err(|e| WebhookError::ParseError(format!("Unexpected PayPal resource: {}", e)))
}

fn parse_time(value: Option<&str>) -> Option<Timestamp> {
    value.and_then(Timestamp::parse_rfc3339)
}

/// Returns the canonical status and whether the subscription is winding down.
fn normalize_status(status: &str) -> Option<(SubscriptionStatus, bool)> {
    match status {
        "ACTIVE" => Some((SubscriptionStatus::Active, false)),
        "SUSPENDED" => Some((SubscriptionStatus::Active, true)),
        "CANCELLED" | "EXPIRED" => Some((SubscriptionStatus::Canceled, false)),
        "APPROVAL_PENDING" | "APPROVED" => Some((SubscriptionStatus::Incomplete, false)),
        other => {
            tracing::warn!(status = other, "Unrecognised PayPal subscription status");
            None
        }
    }
}

/// `custom_id` carries either `{"user_id": .., "plan_id": ..}` or a bare user id.
fn custom_metadata(custom: Option<&str>) -> HashMap<String, String> {
    let Some(custom) = custom.map(str::trim).filter(|c| !c.is_empty()) else {
        return HashMap::new();
    };
    match serde_json::from_str::<HashMap<String, serde_json::Value>>(custom) {
        Ok(map) => map
            .into_iter()
            .filter_map(|(k, v)| match v {
                serde_json::Value::String(s) => Some((k, s)),
                serde_json::Value::Null => None,
                other => Some((k, other.to_string())),
            })
            .collect(),
        Err(_) => HashMap::from([("user_id".to_string(), custom.to_string())]),
    }
}

/// Converts a decimal string like `"29.00"` into minor units.
fn amount_to_cents(value: &str) -> Option<i64> {
    let value = value.trim();
    let (negative, value) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };
    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
    if fraction.len() > 2 || (whole.is_empty() && fraction.is_empty()) {
        return None;
    }
    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let fraction: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().ok()? * 10,
        _ => fraction.parse().ok()?,
    };
    let cents = whole.checked_mul(100)?.checked_add(fraction)?;
    Some(if negative { -cents } else { cents })
}

fn money(amount: Option<&PaypalMoney>) -> (Option<i64>, Option<String>) {
    match amount {
        Some(m) => (
            amount_to_cents(&m.value),
            Some(m.currency_code.to_lowercase()),
        ),
        None => (None, None),
    }
}

fn subscription_data(resource: &serde_json::Value) -> Result<WebhookEventData, WebhookError> {
    let sub: PaypalSubscription = decode(resource)?;
    let normalized = sub.status.as_deref().and_then(normalize_status);
    let billing = sub.billing_info.as_ref();

    let period_start = billing
        .and_then(|b| b.last_payment.as_ref())
        .and_then(|p| parse_time(p.time.as_deref()))
        .or_else(|| parse_time(sub.start_time.as_deref()));
    let period_end = billing.and_then(|b| parse_time(b.next_billing_time.as_deref()));
    let canceled_at = match normalized {
        Some((SubscriptionStatus::Canceled, _)) => parse_time(sub.status_update_time.as_deref()),
        _ => None,
    };

    Ok(WebhookEventData {
        subscription_id: Some(sub.id),
        customer_id: sub.subscriber.and_then(|s| s.payer_id),
        status: normalized.map(|(status, _)| status),
        current_period_start: period_start,
        current_period_end: period_end,
        cancel_at_period_end: normalized.map(|(_, winding_down)| winding_down),
        canceled_at,
        metadata: custom_metadata(sub.custom_id.as_deref()),
        raw: resource.clone(),
        ..Default::default()
    })
}

fn failed_payment_data(resource: &serde_json::Value) -> Result<WebhookEventData, WebhookError> {
    let sub: PaypalSubscription = decode(resource)?;
    let (amount_cents, currency) = money(
        sub.billing_info
            .as_ref()
            .and_then(|b| b.last_failed_payment.as_ref())
            .and_then(|p| p.amount.as_ref()),
    );

    Ok(WebhookEventData {
        subscription_id: Some(sub.id),
        customer_id: sub.subscriber.and_then(|s| s.payer_id),
        amount_cents,
        currency,
        metadata: custom_metadata(sub.custom_id.as_deref()),
        raw: resource.clone(),
        ..Default::default()
    })
}

fn sale_data(resource: &serde_json::Value) -> Result<WebhookEventData, WebhookError> {
    let sale: PaypalSale = decode(resource)?;
    let (amount_cents, currency) = money(sale.amount.as_ref());

    Ok(WebhookEventData {
        subscription_id: sale.billing_agreement_id,
        invoice_id: Some(sale.sale_id.unwrap_or(sale.id)),
        amount_cents,
        currency,
        metadata: custom_metadata(sale.custom.as_deref()),
        raw: resource.clone(),
        ..Default::default()
    })
}

fn dispute_data(resource: &serde_json::Value) -> Result<WebhookEventData, WebhookError> {
    let dispute: PaypalDispute = decode(resource)?;
    let (amount_cents, currency) = money(dispute.dispute_amount.as_ref());

    Ok(WebhookEventData {
        invoice_id: Some(dispute.dispute_id),
        amount_cents,
        currency,
        raw: resource.clone(),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEBHOOK_ID: &str = "WH-ID-1";
    const SECRET: &str = "paypal_secret";

    fn adapter() -> PaypalWebhookAdapter {
        PaypalWebhookAdapter::new(PaypalWebhookConfig::new(
            WEBHOOK_ID,
            SecretString::new(SECRET.to_string()),
        ))
    }

    fn sign(secret: &str, transmission_time: &str, body: &str) -> String {
        let message = format!(
            "tx-1|{}|{}|{}",
            transmission_time,
            WEBHOOK_ID,
            sha256_hex(body.as_bytes())
        );
        let mac = hmac_sha256(secret.as_bytes(), message.as_bytes()).unwrap();
        format!(
            "transmission_id=tx-1,transmission_time={},signature={}",
            transmission_time,
            hex::encode(mac)
        )
    }

    fn subscription_event(event_type: &str, status: &str) -> String {
        format!(
            r#"{{
                "id": "WH-1",
                "event_type": "{}",
                "create_time": "2024-03-01T10:00:00Z",
                "resource": {{
                    "id": "I-SUB1",
                    "status": "{}",
                    "custom_id": "{{\"user_id\":\"user-1\",\"plan_id\":\"pro_monthly\"}}",
                    "status_update_time": "2024-03-01T09:59:00Z",
                    "subscriber": {{"payer_id": "PAYER1"}},
                    "billing_info": {{
                        "next_billing_time": "2024-04-01T00:00:00Z",
                        "last_payment": {{"time": "2024-03-01T00:00:00Z"}}
                    }}
                }}
            }}"#,
            event_type, status
        )
    }

    // ══════════════════════════════════════════════════════════════
    // Signature Verification
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn accepts_valid_signature() {
        let now = Timestamp::now();
        let body = r#"{"id":"WH-1"}"#;
        let header = sign(SECRET, &now.to_iso8601(), body);

        assert!(adapter().verify(body.as_bytes(), &header, now).is_ok());
    }

    #[test]
    fn rejects_modified_body() {
        let now = Timestamp::now();
        let header = sign(SECRET, &now.to_iso8601(), r#"{"id":"WH-1"}"#);

        assert!(matches!(
            adapter().verify(br#"{"id":"WH-2"}"#, &header, now),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_stale_transmission() {
        let now = Timestamp::now();
        let body = r#"{"id":"WH-1"}"#;
        let header = sign(SECRET, &now.minus_days(1).to_iso8601(), body);

        assert!(matches!(
            adapter().verify(body.as_bytes(), &header, now),
            Err(WebhookError::TimestampOutOfRange)
        ));
    }

    // ══════════════════════════════════════════════════════════════
    // Normalization
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn suspended_maps_to_active_winding_down() {
        let body = subscription_event("BILLING.SUBSCRIPTION.SUSPENDED", "SUSPENDED");

        let event = adapter().parse_webhook_event(body.as_bytes(), "").unwrap();

        assert_eq!(event.event_type, WebhookEventType::SubscriptionUpdated);
        assert_eq!(event.data.status, Some(SubscriptionStatus::Active));
        assert_eq!(event.data.cancel_at_period_end, Some(true));
        assert_eq!(event.data.customer_id.as_deref(), Some("PAYER1"));
        assert_eq!(event.data.metadata_value("plan_id"), Some("pro_monthly"));
        assert_eq!(
            event.data.current_period_end,
            Timestamp::parse_rfc3339("2024-04-01T00:00:00Z")
        );
    }

    #[test]
    fn expired_maps_to_canceled() {
        let body = subscription_event("BILLING.SUBSCRIPTION.EXPIRED", "EXPIRED");

        let event = adapter().parse_webhook_event(body.as_bytes(), "").unwrap();

        assert_eq!(event.event_type, WebhookEventType::SubscriptionCanceled);
        assert_eq!(event.data.status, Some(SubscriptionStatus::Canceled));
        assert!(event.data.canceled_at.is_some());
    }

    #[test]
    fn approval_pending_maps_to_incomplete() {
        let body = subscription_event("BILLING.SUBSCRIPTION.CREATED", "APPROVAL_PENDING");

        let event = adapter().parse_webhook_event(body.as_bytes(), "").unwrap();

        assert_eq!(event.event_type, WebhookEventType::SubscriptionCreated);
        assert_eq!(event.data.status, Some(SubscriptionStatus::Incomplete));
    }

    #[test]
    fn sale_completed_is_invoice_paid_in_cents() {
        let body = r#"{
            "id": "WH-2",
            "event_type": "PAYMENT.SALE.COMPLETED",
            "create_time": "2024-03-01T10:00:00Z",
            "resource": {
                "id": "SALE-1",
                "billing_agreement_id": "I-SUB1",
                "amount": {"total": "29.90", "currency": "USD"}
            }
        }"#;

        let event = adapter().parse_webhook_event(body.as_bytes(), "").unwrap();

        assert_eq!(event.event_type, WebhookEventType::InvoicePaid);
        assert_eq!(event.data.subscription_id.as_deref(), Some("I-SUB1"));
        assert_eq!(event.data.invoice_id.as_deref(), Some("SALE-1"));
        assert_eq!(event.data.amount_cents, Some(2990));
        assert_eq!(event.data.currency.as_deref(), Some("usd"));
    }

    #[test]
    fn plain_custom_id_is_user_id() {
        let metadata = custom_metadata(Some("user-42"));
        assert_eq!(metadata.get("user_id").map(String::as_str), Some("user-42"));
        assert!(custom_metadata(Some("  ")).is_empty());
    }

    #[test]
    fn amount_conversion() {
        assert_eq!(amount_to_cents("29.00"), Some(2900));
        assert_eq!(amount_to_cents("5"), Some(500));
        assert_eq!(amount_to_cents("0.5"), Some(50));
        assert_eq!(amount_to_cents("-1.25"), Some(-125));
        assert_eq!(amount_to_cents("1.999"), None);
        assert_eq!(amount_to_cents("abc"), None);
    }

    #[test]
    fn unknown_event_passes_through() {
        let body = r#"{"id":"WH-3","event_type":"CATALOG.PRODUCT.CREATED","resource":{}}"#;

        let event = adapter().parse_webhook_event(body.as_bytes(), "").unwrap();

        assert_eq!(
            event.event_type,
            WebhookEventType::Unknown("CATALOG.PRODUCT.CREATED".to_string())
        );
    }
}
