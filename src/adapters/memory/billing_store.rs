//! In-memory billing store and unit of work.
//!
//! Holds subscriptions, customer mappings, invoices and the billing event
//! ledger behind one lock. A transaction works on a private copy of the
//! tables and stages its writes; commit replays the staged writes against
//! the live tables under the write lock and applies none of them if any
//! conflicts. That gives the same observable behavior as a unique index on
//! `(provider, provider_event_id)`: of two concurrent deliveries of one
//! event, exactly one commits.
//!
//! Suitable for tests and single-process deployments. Does not persist
//! across restarts.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::domain::billing::{
    BillingEvent, CustomerMapping, Invoice, Provider, Subscription, SubscriptionStatus,
};
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp, UserId};
use crate::ports::{
    BillingEventRepository, BillingTransaction, BillingUnitOfWork, CustomerMappingRepository,
    InvoiceRepository, SaveResult, SubscriptionRepository,
};

type ProviderKey = (Provider, String);

#[derive(Debug, Clone, Default)]
struct BillingTables {
    subscriptions: HashMap<SubscriptionId, Subscription>,
    customer_mappings: HashMap<ProviderKey, CustomerMapping>,
    invoices: HashMap<ProviderKey, Invoice>,
    billing_events: HashMap<ProviderKey, BillingEvent>,
}

/// A write recorded by a transaction, replayed at commit.
#[derive(Debug, Clone)]
enum StagedWrite {
    CreateSubscription(Subscription),
    UpdateSubscription(Subscription),
    UpdateSubscriptionIfStatus(Subscription, SubscriptionStatus),
    CreateCustomerMapping(CustomerMapping),
    UpsertInvoice(Invoice),
    RecordEvent(BillingEvent),
}

impl BillingTables {
    fn subscription_by_provider_id(
        &self,
        provider: Provider,
        provider_subscription_id: &str,
    ) -> Option<&Subscription> {
        self.subscriptions.values().find(|s| {
            s.provider == provider && s.provider_subscription_id == provider_subscription_id
        })
    }

    /// Most recently created live subscription for the user.
    fn active_for_user(&self, user_id: &UserId) -> Option<Subscription> {
        self.subscriptions
            .values()
            .filter(|s| &s.user_id == user_id && s.status.is_live())
            .max_by_key(|s| s.created_at)
            .cloned()
    }

    fn past_due(&self) -> Vec<Subscription> {
        let mut found: Vec<Subscription> = self
            .subscriptions
            .values()
            .filter(|s| s.status == SubscriptionStatus::PastDue)
            .cloned()
            .collect();
        found.sort_by_key(|s| s.updated_at);
        found
    }

    fn create_subscription(&mut self, subscription: &Subscription) -> Result<(), DomainError> {
        if self
            .subscription_by_provider_id(
                subscription.provider,
                &subscription.provider_subscription_id,
            )
            .is_some()
        {
            return Err(DomainError::new(
                ErrorCode::SubscriptionExists,
                format!(
                    "Subscription {} already exists for {}",
                    subscription.provider_subscription_id, subscription.provider
                ),
            ));
        }
        self.subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    fn update_subscription(&mut self, subscription: &Subscription) -> Result<(), DomainError> {
        match self.subscriptions.get_mut(&subscription.id) {
            Some(slot) => {
                *slot = subscription.clone();
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("Subscription {} not found", subscription.id),
            )),
        }
    }

    fn update_subscription_if_status(
        &mut self,
        subscription: &Subscription,
        expected: SubscriptionStatus,
    ) -> Result<bool, DomainError> {
        match self.subscriptions.get_mut(&subscription.id) {
            Some(slot) if slot.status == expected => {
                *slot = subscription.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("Subscription {} not found", subscription.id),
            )),
        }
    }

    fn create_customer_mapping(&mut self, mapping: &CustomerMapping) -> Result<(), DomainError> {
        let key = (mapping.provider, mapping.provider_customer_id.clone());
        if self.customer_mappings.contains_key(&key) {
            return Err(DomainError::database(format!(
                "Customer mapping for {} already exists",
                mapping.provider_customer_id
            )));
        }
        self.customer_mappings.insert(key, mapping.clone());
        Ok(())
    }

    /// Keeps the id and creation time of an existing row.
    fn upsert_invoice(&mut self, invoice: &Invoice) -> Invoice {
        let key = (invoice.provider, invoice.provider_invoice_id.clone());
        let stored = match self.invoices.get(&key) {
            Some(existing) => Invoice {
                id: existing.id,
                created_at: existing.created_at,
                ..invoice.clone()
            },
            None => invoice.clone(),
        };
        self.invoices.insert(key, stored.clone());
        stored
    }

    fn record_event(&mut self, event: &BillingEvent) -> SaveResult {
        let key = (event.provider, event.provider_event_id.clone());
        if self.billing_events.contains_key(&key) {
            return SaveResult::AlreadyExists;
        }
        self.billing_events.insert(key, event.clone());
        SaveResult::Inserted
    }

    fn delete_events_before(&mut self, timestamp: Timestamp) -> u64 {
        let before = self.billing_events.len();
        self.billing_events
            .retain(|_, event| event.processed_at >= timestamp);
        (before - self.billing_events.len()) as u64
    }

    fn apply(&mut self, write: &StagedWrite) -> Result<(), DomainError> {
        match write {
            StagedWrite::CreateSubscription(s) => self.create_subscription(s),
            StagedWrite::UpdateSubscription(s) => self.update_subscription(s),
            StagedWrite::UpdateSubscriptionIfStatus(s, expected) => {
                if self.update_subscription_if_status(s, *expected)? {
                    Ok(())
                } else {
                    Err(DomainError::new(
                        ErrorCode::ConcurrentModification,
                        format!("Subscription {} left {} before commit", s.id, expected),
                    ))
                }
            }
            StagedWrite::CreateCustomerMapping(m) => self.create_customer_mapping(m),
            StagedWrite::UpsertInvoice(i) => {
                self.upsert_invoice(i);
                Ok(())
            }
            StagedWrite::RecordEvent(e) => match self.record_event(e) {
                SaveResult::Inserted => Ok(()),
                SaveResult::AlreadyExists => Err(DomainError::new(
                    ErrorCode::DuplicateEvent,
                    format!(
                        "Event {} from {} was committed concurrently",
                        e.provider_event_id, e.provider
                    ),
                )),
            },
        }
    }
}

/// In-memory billing records with transactional access.
#[derive(Clone, Default)]
pub struct InMemoryBillingStore {
    tables: Arc<RwLock<BillingTables>>,
    fail_subscription_writes: Arc<AtomicBool>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    // === Test Helpers ===

    /// Stores a subscription as-is, replacing any row with the same id.
    pub async fn insert_subscription(&self, subscription: Subscription) {
        self.tables
            .write()
            .await
            .subscriptions
            .insert(subscription.id, subscription);
    }

    /// Finds a subscription by provider id regardless of provider.
    pub async fn subscription_by_provider_id(&self, provider_subscription_id: &str) -> Option<Subscription> {
        self.tables
            .read()
            .await
            .subscriptions
            .values()
            .find(|s| s.provider_subscription_id == provider_subscription_id)
            .cloned()
    }

    pub async fn subscription_count(&self) -> usize {
        self.tables.read().await.subscriptions.len()
    }

    pub async fn billing_event_count(&self) -> usize {
        self.tables.read().await.billing_events.len()
    }

    pub async fn customer_mapping_count(&self) -> usize {
        self.tables.read().await.customer_mappings.len()
    }

    pub async fn invoices(&self) -> Vec<Invoice> {
        self.tables.read().await.invoices.values().cloned().collect()
    }

    /// Makes subscription create/update fail with a database error.
    pub fn fail_subscription_writes(&self, fail: bool) {
        self.fail_subscription_writes.store(fail, Ordering::SeqCst);
    }

    fn check_subscription_writes(&self) -> Result<(), DomainError> {
        if self.fail_subscription_writes.load(Ordering::SeqCst) {
            return Err(DomainError::database("Simulated subscription write failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for InMemoryBillingStore {
    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        Ok(self.tables.read().await.subscriptions.get(id).cloned())
    }

    async fn find_active_by_user_id(&self, user_id: &UserId) -> Result<Option<Subscription>, DomainError> {
        Ok(self.tables.read().await.active_for_user(user_id))
    }

    async fn find_by_provider_subscription_id(
        &self,
        provider: Provider,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .tables
            .read()
            .await
            .subscription_by_provider_id(provider, provider_subscription_id)
            .cloned())
    }

    async fn find_past_due(&self) -> Result<Vec<Subscription>, DomainError> {
        Ok(self.tables.read().await.past_due())
    }

    async fn create(&self, subscription: &Subscription) -> Result<(), DomainError> {
        self.check_subscription_writes()?;
        self.tables.write().await.create_subscription(subscription)
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        self.check_subscription_writes()?;
        self.tables.write().await.update_subscription(subscription)
    }

    async fn update_if_status(
        &self,
        subscription: &Subscription,
        expected: SubscriptionStatus,
    ) -> Result<bool, DomainError> {
        self.check_subscription_writes()?;
        self.tables
            .write()
            .await
            .update_subscription_if_status(subscription, expected)
    }
}

#[async_trait]
impl CustomerMappingRepository for InMemoryBillingStore {
    async fn find_by_provider_customer_id(
        &self,
        provider: Provider,
        provider_customer_id: &str,
    ) -> Result<Option<CustomerMapping>, DomainError> {
        Ok(self
            .tables
            .read()
            .await
            .customer_mappings
            .get(&(provider, provider_customer_id.to_string()))
            .cloned())
    }

    async fn create(&self, mapping: &CustomerMapping) -> Result<(), DomainError> {
        self.tables.write().await.create_customer_mapping(mapping)
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryBillingStore {
    async fn upsert(&self, invoice: &Invoice) -> Result<Invoice, DomainError> {
        Ok(self.tables.write().await.upsert_invoice(invoice))
    }

    async fn find_by_provider_invoice_id(
        &self,
        provider: Provider,
        provider_invoice_id: &str,
    ) -> Result<Option<Invoice>, DomainError> {
        Ok(self
            .tables
            .read()
            .await
            .invoices
            .get(&(provider, provider_invoice_id.to_string()))
            .cloned())
    }
}

#[async_trait]
impl BillingEventRepository for InMemoryBillingStore {
    async fn was_processed(&self, provider: Provider, provider_event_id: &str) -> Result<bool, DomainError> {
        Ok(self
            .tables
            .read()
            .await
            .billing_events
            .contains_key(&(provider, provider_event_id.to_string())))
    }

    async fn record_event(&self, event: &BillingEvent) -> Result<SaveResult, DomainError> {
        Ok(self.tables.write().await.record_event(event))
    }

    async fn delete_before(&self, timestamp: Timestamp) -> Result<u64, DomainError> {
        Ok(self.tables.write().await.delete_events_before(timestamp))
    }
}

#[async_trait]
impl BillingUnitOfWork for InMemoryBillingStore {
    async fn begin(&self) -> Result<Box<dyn BillingTransaction>, DomainError> {
        let snapshot = self.tables.read().await.clone();
        Ok(Box::new(InMemoryBillingTransaction {
            store: self.clone(),
            working: Mutex::new(snapshot),
            staged: Mutex::new(Vec::new()),
        }))
    }
}

/// Transaction over a private copy of the billing tables.
pub struct InMemoryBillingTransaction {
    store: InMemoryBillingStore,
    working: Mutex<BillingTables>,
    staged: Mutex<Vec<StagedWrite>>,
}

impl InMemoryBillingTransaction {
    async fn stage(&self, write: StagedWrite) -> Result<(), DomainError> {
        self.working.lock().await.apply(&write)?;
        self.staged.lock().await.push(write);
        Ok(())
    }
}

#[async_trait]
impl BillingTransaction for InMemoryBillingTransaction {
    fn subscriptions(&self) -> &dyn SubscriptionRepository {
        self
    }

    fn customer_mappings(&self) -> &dyn CustomerMappingRepository {
        self
    }

    fn invoices(&self) -> &dyn InvoiceRepository {
        self
    }

    fn billing_events(&self) -> &dyn BillingEventRepository {
        self
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let this = *self;
        let staged = this.staged.into_inner();
        if staged.is_empty() {
            return Ok(());
        }

        let mut live = this.store.tables.write().await;

        // Ledger conflicts win over any other conflict the replay would hit.
        for write in &staged {
            if let StagedWrite::RecordEvent(e) = write {
                let key = (e.provider, e.provider_event_id.clone());
                if live.billing_events.contains_key(&key) {
                    return Err(DomainError::new(
                        ErrorCode::DuplicateEvent,
                        format!(
                            "Event {} from {} was committed concurrently",
                            e.provider_event_id, e.provider
                        ),
                    ));
                }
            }
        }

        let mut next = live.clone();
        for write in &staged {
            next.apply(write)?;
        }
        *live = next;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for InMemoryBillingTransaction {
    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        Ok(self.working.lock().await.subscriptions.get(id).cloned())
    }

    async fn find_active_by_user_id(&self, user_id: &UserId) -> Result<Option<Subscription>, DomainError> {
        Ok(self.working.lock().await.active_for_user(user_id))
    }

    async fn find_by_provider_subscription_id(
        &self,
        provider: Provider,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .working
            .lock()
            .await
            .subscription_by_provider_id(provider, provider_subscription_id)
            .cloned())
    }

    async fn find_past_due(&self) -> Result<Vec<Subscription>, DomainError> {
        Ok(self.working.lock().await.past_due())
    }

    async fn create(&self, subscription: &Subscription) -> Result<(), DomainError> {
        self.store.check_subscription_writes()?;
        self.stage(StagedWrite::CreateSubscription(subscription.clone()))
            .await
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        self.store.check_subscription_writes()?;
        self.stage(StagedWrite::UpdateSubscription(subscription.clone()))
            .await
    }

    /// Checked against the working copy now and against the live tables
    /// again at commit.
    async fn update_if_status(
        &self,
        subscription: &Subscription,
        expected: SubscriptionStatus,
    ) -> Result<bool, DomainError> {
        self.store.check_subscription_writes()?;
        if !self
            .working
            .lock()
            .await
            .update_subscription_if_status(subscription, expected)?
        {
            return Ok(false);
        }
        self.staged
            .lock()
            .await
            .push(StagedWrite::UpdateSubscriptionIfStatus(subscription.clone(), expected));
        Ok(true)
    }
}

#[async_trait]
impl CustomerMappingRepository for InMemoryBillingTransaction {
    async fn find_by_provider_customer_id(
        &self,
        provider: Provider,
        provider_customer_id: &str,
    ) -> Result<Option<CustomerMapping>, DomainError> {
        Ok(self
            .working
            .lock()
            .await
            .customer_mappings
            .get(&(provider, provider_customer_id.to_string()))
            .cloned())
    }

    async fn create(&self, mapping: &CustomerMapping) -> Result<(), DomainError> {
        self.stage(StagedWrite::CreateCustomerMapping(mapping.clone()))
            .await
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryBillingTransaction {
    async fn upsert(&self, invoice: &Invoice) -> Result<Invoice, DomainError> {
        let stored = self.working.lock().await.upsert_invoice(invoice);
        self.staged
            .lock()
            .await
            .push(StagedWrite::UpsertInvoice(invoice.clone()));
        Ok(stored)
    }

    async fn find_by_provider_invoice_id(
        &self,
        provider: Provider,
        provider_invoice_id: &str,
    ) -> Result<Option<Invoice>, DomainError> {
        Ok(self
            .working
            .lock()
            .await
            .invoices
            .get(&(provider, provider_invoice_id.to_string()))
            .cloned())
    }
}

#[async_trait]
impl BillingEventRepository for InMemoryBillingTransaction {
    async fn was_processed(&self, provider: Provider, provider_event_id: &str) -> Result<bool, DomainError> {
        Ok(self
            .working
            .lock()
            .await
            .billing_events
            .contains_key(&(provider, provider_event_id.to_string())))
    }

    async fn record_event(&self, event: &BillingEvent) -> Result<SaveResult, DomainError> {
        let result = self.working.lock().await.record_event(event);
        if result == SaveResult::Inserted {
            self.staged
                .lock()
                .await
                .push(StagedWrite::RecordEvent(event.clone()));
        }
        Ok(result)
    }

    async fn delete_before(&self, timestamp: Timestamp) -> Result<u64, DomainError> {
        // Pruning is not transactional; it goes straight to the live ledger.
        self.store.delete_before(timestamp).await
    }
}
