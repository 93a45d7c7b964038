//! Provider-neutral webhook event.
//!
//! Each provider adapter turns its own payload shape into a
//! [`NormalizedWebhookEvent`]. The processor only ever branches on
//! [`WebhookEventType`], never on provider identity.

use crate::domain::foundation::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::SubscriptionStatus;

/// Canonical event types the processor routes on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEventType {
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionCanceled,
    InvoicePaid,
    InvoicePaymentFailed,
    RefundCreated,
    ChargebackCreated,
    /// Anything else, carrying the provider's own type string.
    Unknown(String),
}

impl WebhookEventType {
    /// Maps the canonical dotted name back to a variant.
    pub fn from_canonical(name: &str) -> Self {
        match name {
            "subscription.created" => WebhookEventType::SubscriptionCreated,
            "subscription.updated" => WebhookEventType::SubscriptionUpdated,
            "subscription.canceled" => WebhookEventType::SubscriptionCanceled,
            "invoice.paid" => WebhookEventType::InvoicePaid,
            "invoice.payment_failed" => WebhookEventType::InvoicePaymentFailed,
            "refund.created" => WebhookEventType::RefundCreated,
            "chargeback.created" => WebhookEventType::ChargebackCreated,
            other => WebhookEventType::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            WebhookEventType::SubscriptionCreated => "subscription.created",
            WebhookEventType::SubscriptionUpdated => "subscription.updated",
            WebhookEventType::SubscriptionCanceled => "subscription.canceled",
            WebhookEventType::InvoicePaid => "invoice.paid",
            WebhookEventType::InvoicePaymentFailed => "invoice.payment_failed",
            WebhookEventType::RefundCreated => "refund.created",
            WebhookEventType::ChargebackCreated => "chargeback.created",
            WebhookEventType::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed payload fields. Every field is optional because providers send
/// partial objects and redeliveries may be stale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookEventData {
    pub subscription_id: Option<String>,
    pub customer_id: Option<String>,
    pub invoice_id: Option<String>,
    pub status: Option<SubscriptionStatus>,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: Option<bool>,
    pub canceled_at: Option<Timestamp>,
    pub trial_end: Option<Timestamp>,
    pub amount_cents: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Original provider object, kept for diagnostics.
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl WebhookEventData {
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedWebhookEvent {
    /// Provider event id, half of the idempotency key.
    pub id: String,
    pub event_type: WebhookEventType,
    pub data: WebhookEventData,
    pub created_at: Timestamp,
}
