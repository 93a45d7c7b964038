//! Idempotency ledger entries for processed webhooks.

use crate::domain::foundation::{BillingEventId, Timestamp};
use serde::{Deserialize, Serialize};

use super::Provider;

/// A processed webhook. `(provider, provider_event_id)` is unique at the
/// storage layer. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingEvent {
    pub id: BillingEventId,
    pub provider: Provider,
    pub provider_event_id: String,
    pub event_type: String,
    pub processed_at: Timestamp,
}

impl BillingEvent {
    pub fn new(
        provider: Provider,
        provider_event_id: impl Into<String>,
        event_type: impl Into<String>,
        processed_at: Timestamp,
    ) -> Self {
        Self {
            id: BillingEventId::new(),
            provider,
            provider_event_id: provider_event_id.into(),
            event_type: event_type.into(),
            processed_at,
        }
    }
}
