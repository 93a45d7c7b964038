//! WebhookProcessor - turns one provider webhook into one committed,
//! idempotent state change.
//!
//! ## Flow
//!
//! 1. Verify the signature (no transaction, nothing recorded on failure)
//! 2. Normalize the payload through the provider's adapter
//! 3. Inside one transaction: check the ledger, record the event,
//!    dispatch by event type, commit
//!
//! ## Race Condition Handling
//!
//! The ledger insert is insert-or-conflict on `(provider, event id)`. When
//! two deliveries race past the initial check, the loser sees
//! `AlreadyExists` (or a conflict at commit) before any handler writes are
//! kept, and its transaction is rolled back.
//!
//! ## Failure Semantics
//!
//! Missing data (unknown subscription, absent metadata) is logged and
//! skipped so stale redeliveries don't poison the ledger. Any other failure
//! is logged with event context and rolls back the ledger row with
//! everything else, so the provider's redelivery retries it.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::billing::{
    BillingEvent, CustomerMapping, Invoice, InvoiceStatus, NewSubscription,
    NormalizedWebhookEvent, Provider, Subscription, SubscriptionStatus, WebhookError,
    WebhookEventType,
};
use crate::domain::foundation::{DomainError, InvoiceId, PlanId, Timestamp, UserId};
use crate::ports::{
    BillingTransaction, BillingUnitOfWork, ProviderWebhookAdapter, SaveResult,
};

use super::dunning::{apply_payment_failure, apply_payment_success};

/// Outcome of a processed webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookResult {
    pub success: bool,
    pub message: String,
    pub event_id: String,
}

/// Processes provider webhooks with idempotency guarantees.
pub struct WebhookProcessor {
    unit_of_work: Arc<dyn BillingUnitOfWork>,
    adapters: HashMap<Provider, Arc<dyn ProviderWebhookAdapter>>,
}

impl WebhookProcessor {
    pub fn new(unit_of_work: Arc<dyn BillingUnitOfWork>) -> Self {
        Self {
            unit_of_work,
            adapters: HashMap::new(),
        }
    }

    /// Registers the adapter for its provider.
    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderWebhookAdapter>) -> Self {
        self.adapters.insert(adapter.provider(), adapter);
        self
    }

    /// Entry point for one provider's webhook endpoint.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` when verification fails
    /// - `ParseError` when the payload can't be normalized
    /// - `AlreadyProcessed` for a duplicate delivery; callers treat it as success
    /// - `Database`/`Processing` for failures that should be retried
    pub async fn process(
        &self,
        provider: Provider,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookResult, WebhookError> {
        let adapter = self.adapters.get(&provider).ok_or_else(|| {
            WebhookError::Processing(format!("No webhook adapter registered for {}", provider))
        })?;

        if !adapter.verify_webhook_signature(payload, signature) {
            tracing::warn!(provider = %provider, "Webhook signature verification failed");
            return Err(WebhookError::InvalidSignature);
        }

        let event = adapter.parse_webhook_event(payload, signature)?;
        self.process_event(provider, event).await
    }

    /// Runs the transactional part for an already verified, normalized event.
    pub async fn process_event(
        &self,
        provider: Provider,
        event: NormalizedWebhookEvent,
    ) -> Result<WebhookResult, WebhookError> {
        let tx = self.unit_of_work.begin().await?;

        if tx.billing_events().was_processed(provider, &event.id).await? {
            tracing::info!(
                provider = %provider,
                event_id = %event.id,
                event_type = %event.event_type,
                "Webhook event already processed"
            );
            rollback(tx, &event).await;
            return Err(WebhookError::already_processed(&event.id));
        }

        // Claiming the ledger row first serializes concurrent deliveries on
        // its unique key; a rollback releases the claim.
        let now = Timestamp::now();
        let record = BillingEvent::new(provider, &event.id, event.event_type.as_str(), now);
        match tx.billing_events().record_event(&record).await? {
            SaveResult::Inserted => {}
            SaveResult::AlreadyExists => {
                tracing::info!(
                    event_id = %event.id,
                    "Concurrent delivery recorded the event first"
                );
                rollback(tx, &event).await;
                return Err(WebhookError::already_processed(&event.id));
            }
        }

        let message = match dispatch(tx.as_ref(), provider, &event, now).await {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(
                    provider = %provider,
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %e,
                    "Webhook handler failed"
                );
                rollback(tx, &event).await;
                return Err(e.into());
            }
        };

        if let Err(e) = tx.commit().await {
            if e.is_duplicate_event() {
                tracing::info!(event_id = %event.id, "Concurrent delivery committed first");
                return Err(WebhookError::already_processed(&event.id));
            }
            tracing::error!(event_id = %event.id, error = %e, "Webhook commit failed");
            return Err(e.into());
        }

        tracing::info!(
            provider = %provider,
            event_id = %event.id,
            event_type = %event.event_type,
            "Webhook event processed"
        );
        Ok(WebhookResult {
            success: true,
            message,
            event_id: event.id,
        })
    }
}

async fn rollback(tx: Box<dyn BillingTransaction>, event: &NormalizedWebhookEvent) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(event_id = %event.id, error = %e, "Rollback failed");
    }
}

async fn dispatch(
    tx: &dyn BillingTransaction,
    provider: Provider,
    event: &NormalizedWebhookEvent,
    now: Timestamp,
) -> Result<String, DomainError> {
    match &event.event_type {
        WebhookEventType::SubscriptionCreated => {
            handle_subscription_created(tx, provider, event, now).await
        }
        WebhookEventType::SubscriptionUpdated => {
            handle_subscription_updated(tx, provider, event, now).await
        }
        WebhookEventType::SubscriptionCanceled => {
            handle_subscription_canceled(tx, provider, event, now).await
        }
        WebhookEventType::InvoicePaid => handle_invoice_paid(tx, provider, event, now).await,
        WebhookEventType::InvoicePaymentFailed => {
            handle_invoice_payment_failed(tx, provider, event, now).await
        }
        WebhookEventType::RefundCreated => {
            tracing::info!(
                event_id = %event.id,
                invoice_id = ?event.data.invoice_id,
                amount_cents = ?event.data.amount_cents,
                "Refund created"
            );
            Ok("Refund logged".to_string())
        }
        WebhookEventType::ChargebackCreated => {
            tracing::warn!(
                event_id = %event.id,
                invoice_id = ?event.data.invoice_id,
                amount_cents = ?event.data.amount_cents,
                "Chargeback created"
            );
            Ok("Chargeback logged".to_string())
        }
        WebhookEventType::Unknown(raw) => {
            tracing::info!(event_id = %event.id, event_type = %raw, "Unhandled webhook event type");
            Ok(format!("Unhandled event type {}", raw))
        }
    }
}

fn skipped(event: &NormalizedWebhookEvent, reason: &str) -> String {
    tracing::warn!(
        event_id = %event.id,
        event_type = %event.event_type,
        reason,
        "Skipping webhook event"
    );
    format!("Skipped: {}", reason)
}

async fn handle_subscription_created(
    tx: &dyn BillingTransaction,
    provider: Provider,
    event: &NormalizedWebhookEvent,
    now: Timestamp,
) -> Result<String, DomainError> {
    let data = &event.data;
    let (Some(subscription_id), Some(customer_id)) = (&data.subscription_id, &data.customer_id)
    else {
        return Ok(skipped(event, "missing subscription or customer id"));
    };
    let user_id = data.metadata_value("user_id").and_then(|v| UserId::new(v).ok());
    let plan_id = data.metadata_value("plan_id").and_then(|v| PlanId::new(v).ok());
    let (Some(user_id), Some(plan_id)) = (user_id, plan_id) else {
        return Ok(skipped(event, "missing user_id or plan_id metadata"));
    };

    if tx
        .subscriptions()
        .find_by_provider_subscription_id(provider, subscription_id)
        .await?
        .is_some()
    {
        return Ok(skipped(event, "subscription already exists"));
    }

    let subscription = Subscription::create(
        NewSubscription {
            user_id: user_id.clone(),
            plan_id,
            provider,
            provider_subscription_id: subscription_id.clone(),
            provider_customer_id: customer_id.clone(),
            status: data.status.unwrap_or(SubscriptionStatus::Active),
            current_period_start: data.current_period_start,
            current_period_end: data.current_period_end,
            trial_end: data.trial_end,
            metadata: data.metadata.clone(),
        },
        now,
    );
    tx.subscriptions().create(&subscription).await?;

    if tx
        .customer_mappings()
        .find_by_provider_customer_id(provider, customer_id)
        .await?
        .is_none()
    {
        tx.customer_mappings()
            .create(&CustomerMapping::new(user_id, provider, customer_id.clone()))
            .await?;
    }

    tracing::info!(
        subscription_id = %subscription.id,
        user_id = %subscription.user_id,
        status = %subscription.status,
        "Subscription created from webhook"
    );
    Ok(format!("Subscription {} created", subscription.id))
}

async fn handle_subscription_updated(
    tx: &dyn BillingTransaction,
    provider: Provider,
    event: &NormalizedWebhookEvent,
    now: Timestamp,
) -> Result<String, DomainError> {
    let data = &event.data;
    let Some(subscription_id) = &data.subscription_id else {
        return Ok(skipped(event, "missing subscription id"));
    };
    let Some(mut subscription) = tx
        .subscriptions()
        .find_by_provider_subscription_id(provider, subscription_id)
        .await?
    else {
        return Ok(skipped(event, "unknown subscription"));
    };

    subscription.sync_from_provider(
        data.status,
        data.current_period_start,
        data.current_period_end,
        data.cancel_at_period_end,
        now,
    );
    tx.subscriptions().update(&subscription).await?;
    Ok(format!("Subscription {} updated", subscription.id))
}

async fn handle_subscription_canceled(
    tx: &dyn BillingTransaction,
    provider: Provider,
    event: &NormalizedWebhookEvent,
    now: Timestamp,
) -> Result<String, DomainError> {
    let data = &event.data;
    let Some(subscription_id) = &data.subscription_id else {
        return Ok(skipped(event, "missing subscription id"));
    };
    let Some(mut subscription) = tx
        .subscriptions()
        .find_by_provider_subscription_id(provider, subscription_id)
        .await?
    else {
        return Ok(skipped(event, "unknown subscription"));
    };

    subscription.mark_canceled(data.canceled_at.unwrap_or(now), now);
    tx.subscriptions().update(&subscription).await?;
    Ok(format!("Subscription {} canceled", subscription.id))
}

async fn handle_invoice_paid(
    tx: &dyn BillingTransaction,
    provider: Provider,
    event: &NormalizedWebhookEvent,
    now: Timestamp,
) -> Result<String, DomainError> {
    let data = &event.data;
    let Some(invoice_id) = &data.invoice_id else {
        return Ok(skipped(event, "missing invoice id"));
    };

    let subscription = match &data.subscription_id {
        Some(id) => {
            tx.subscriptions()
                .find_by_provider_subscription_id(provider, id)
                .await?
        }
        None => None,
    };
    let Some(user_id) = resolve_user(tx, provider, subscription.as_ref(), event).await? else {
        return Ok(skipped(event, "cannot resolve user for invoice"));
    };

    upsert_invoice(
        tx,
        provider,
        invoice_id,
        user_id,
        subscription.as_ref(),
        InvoiceStatus::Paid,
        event,
        now,
    )
    .await?;

    let mut message = format!("Invoice {} paid", invoice_id);
    if let Some(sub) = subscription.filter(|s| s.status == SubscriptionStatus::PastDue) {
        let result =
            apply_payment_success(tx.subscriptions(), provider, &sub.provider_subscription_id, now)
                .await?;
        message.push_str("; ");
        message.push_str(&result.message);
    }
    Ok(message)
}

async fn handle_invoice_payment_failed(
    tx: &dyn BillingTransaction,
    provider: Provider,
    event: &NormalizedWebhookEvent,
    now: Timestamp,
) -> Result<String, DomainError> {
    let data = &event.data;
    let Some(subscription_id) = &data.subscription_id else {
        return Ok(skipped(event, "missing subscription id"));
    };
    let Some(subscription) = tx
        .subscriptions()
        .find_by_provider_subscription_id(provider, subscription_id)
        .await?
    else {
        return Ok(skipped(event, "unknown subscription"));
    };

    if let Some(invoice_id) = &data.invoice_id {
        upsert_invoice(
            tx,
            provider,
            invoice_id,
            subscription.user_id.clone(),
            Some(&subscription),
            InvoiceStatus::Open,
            event,
            now,
        )
        .await?;
    }

    let result = apply_payment_failure(tx.subscriptions(), provider, subscription_id, now).await?;
    Ok(result.message)
}

async fn resolve_user(
    tx: &dyn BillingTransaction,
    provider: Provider,
    subscription: Option<&Subscription>,
    event: &NormalizedWebhookEvent,
) -> Result<Option<UserId>, DomainError> {
    if let Some(sub) = subscription {
        return Ok(Some(sub.user_id.clone()));
    }
    let Some(customer_id) = &event.data.customer_id else {
        return Ok(None);
    };
    Ok(tx
        .customer_mappings()
        .find_by_provider_customer_id(provider, customer_id)
        .await?
        .map(|m| m.user_id))
}

#[allow(clippy::too_many_arguments)]
async fn upsert_invoice(
    tx: &dyn BillingTransaction,
    provider: Provider,
    provider_invoice_id: &str,
    user_id: UserId,
    subscription: Option<&Subscription>,
    status: InvoiceStatus,
    event: &NormalizedWebhookEvent,
    now: Timestamp,
) -> Result<Invoice, DomainError> {
    let invoice = Invoice {
        id: InvoiceId::new(),
        user_id,
        subscription_id: subscription.map(|s| s.id),
        provider,
        provider_invoice_id: provider_invoice_id.to_string(),
        status,
        amount_cents: event.data.amount_cents.unwrap_or(0),
        currency: event
            .data
            .currency
            .clone()
            .unwrap_or_else(|| "usd".to_string()),
        paid_at: (status == InvoiceStatus::Paid).then_some(now),
        created_at: now,
        updated_at: now,
    };
    tx.invoices().upsert(&invoice).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::domain::billing::WebhookEventData;

    struct StubAdapter {
        valid_signature: bool,
        event: NormalizedWebhookEvent,
    }

    impl ProviderWebhookAdapter for StubAdapter {
        fn provider(&self) -> Provider {
            Provider::Stripe
        }

        fn verify_webhook_signature(&self, _payload: &[u8], _signature: &str) -> bool {
            self.valid_signature
        }

        fn parse_webhook_event(
            &self,
            _payload: &[u8],
            _signature: &str,
        ) -> Result<NormalizedWebhookEvent, WebhookError> {
            Ok(self.event.clone())
        }
    }

    fn created_event(id: &str) -> NormalizedWebhookEvent {
        let mut metadata = HashMap::new();
        metadata.insert("user_id".to_string(), "user-1".to_string());
        metadata.insert("plan_id".to_string(), "pro_monthly".to_string());
        NormalizedWebhookEvent {
            id: id.to_string(),
            event_type: WebhookEventType::SubscriptionCreated,
            data: WebhookEventData {
                subscription_id: Some("sub_1".to_string()),
                customer_id: Some("cus_1".to_string()),
                status: Some(SubscriptionStatus::Active),
                metadata,
                ..Default::default()
            },
            created_at: Timestamp::now(),
        }
    }

    fn processor(store: &InMemoryBillingStore, adapter: StubAdapter) -> WebhookProcessor {
        WebhookProcessor::new(Arc::new(store.clone())).with_adapter(Arc::new(adapter))
    }

    // ══════════════════════════════════════════════════════════════
    // Signature and Idempotency
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn invalid_signature_records_nothing() {
        let store = InMemoryBillingStore::new();
        let processor = processor(
            &store,
            StubAdapter {
                valid_signature: false,
                event: created_event("evt_1"),
            },
        );

        let err = processor.process(Provider::Stripe, b"{}", "bad").await.unwrap_err();

        assert!(matches!(err, WebhookError::InvalidSignature));
        assert_eq!(store.billing_event_count().await, 0);
        assert_eq!(store.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_delivery_is_rejected_without_side_effects() {
        let store = InMemoryBillingStore::new();
        let processor = processor(
            &store,
            StubAdapter {
                valid_signature: true,
                event: created_event("evt_1"),
            },
        );

        let first = processor.process(Provider::Stripe, b"{}", "sig").await.unwrap();
        assert!(first.success);
        assert_eq!(first.event_id, "evt_1");

        let second = processor.process(Provider::Stripe, b"{}", "sig").await.unwrap_err();
        assert!(second.is_already_processed());
        assert_eq!(store.subscription_count().await, 1);
        assert_eq!(store.billing_event_count().await, 1);
    }

    #[tokio::test]
    async fn unregistered_provider_is_a_processing_error() {
        let store = InMemoryBillingStore::new();
        let processor = processor(
            &store,
            StubAdapter {
                valid_signature: true,
                event: created_event("evt_1"),
            },
        );

        let err = processor.process(Provider::Paypal, b"{}", "sig").await.unwrap_err();
        assert!(matches!(err, WebhookError::Processing(_)));
    }

    // ══════════════════════════════════════════════════════════════
    // Failure Semantics
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn storage_failure_does_not_record_event() {
        let store = InMemoryBillingStore::new();
        store.fail_subscription_writes(true);
        let processor = processor(
            &store,
            StubAdapter {
                valid_signature: true,
                event: created_event("evt_1"),
            },
        );

        let err = processor.process(Provider::Stripe, b"{}", "sig").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.billing_event_count().await, 0);

        store.fail_subscription_writes(false);
        let retried = processor.process(Provider::Stripe, b"{}", "sig").await.unwrap();
        assert!(retried.success);
        assert_eq!(store.subscription_count().await, 1);
    }

    #[tokio::test]
    async fn missing_metadata_is_skipped_but_recorded() {
        let store = InMemoryBillingStore::new();
        let mut event = created_event("evt_1");
        event.data.metadata.clear();
        let processor = processor(
            &store,
            StubAdapter {
                valid_signature: true,
                event,
            },
        );

        let result = processor.process(Provider::Stripe, b"{}", "sig").await.unwrap();
        assert!(result.message.starts_with("Skipped"));
        assert_eq!(store.subscription_count().await, 0);
        assert_eq!(store.billing_event_count().await, 1);
    }

    #[tokio::test]
    async fn refund_is_logged_only() {
        let store = InMemoryBillingStore::new();
        let event = NormalizedWebhookEvent {
            id: "evt_refund".to_string(),
            event_type: WebhookEventType::RefundCreated,
            data: WebhookEventData::default(),
            created_at: Timestamp::now(),
        };

        let result = processor(
            &store,
            StubAdapter {
                valid_signature: true,
                event: event.clone(),
            },
        )
        .process_event(Provider::Stripe, event)
        .await
        .unwrap();

        assert_eq!(result.message, "Refund logged");
        assert_eq!(store.subscription_count().await, 0);
    }
}
