//! BillingEventRepository port - the webhook idempotency ledger.
//!
//! Providers redeliver webhooks on timeouts, 5xx responses and lost acks,
//! so every event is recorded under `(provider, provider_event_id)` once it
//! has been handled.
//!
//! Implementations must enforce that pair as unique in storage (a unique
//! index with insert-or-conflict semantics). A read-then-write check alone
//! does not hold up against two concurrent deliveries of the same event.

use async_trait::async_trait;

use crate::domain::billing::{BillingEvent, Provider};
use crate::domain::foundation::{DomainError, Timestamp};

/// Result of attempting to record a billing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// Record was inserted (first time seeing this event).
    Inserted,
    /// Record already exists (duplicate event).
    AlreadyExists,
}

#[async_trait]
pub trait BillingEventRepository: Send + Sync {
    /// Returns true if the event is already in the ledger.
    async fn was_processed(
        &self,
        provider: Provider,
        provider_event_id: &str,
    ) -> Result<bool, DomainError>;

    /// Insert-or-conflict. `AlreadyExists` is the idempotency signal.
    async fn record_event(&self, event: &BillingEvent) -> Result<SaveResult, DomainError>;

    /// Delete ledger entries processed before `timestamp`.
    ///
    /// Returns the number of records deleted.
    async fn delete_before(&self, timestamp: Timestamp) -> Result<u64, DomainError>;
}
