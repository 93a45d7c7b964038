//! PostgreSQL billing repositories and unit of work.
//!
//! `PostgresBillingRepository` serves reads and single-statement writes
//! straight from the pool. `PostgresBillingTransaction` runs the same
//! statements inside one database transaction for the webhook processor.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Mutex;

use crate::domain::billing::{
    BillingEvent, CustomerMapping, Invoice, Provider, Subscription, SubscriptionStatus,
};
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp, UserId};
use crate::ports::{
    BillingEventRepository, BillingTransaction, BillingUnitOfWork, CustomerMappingRepository,
    InvoiceRepository, SaveResult, SubscriptionRepository,
};

use super::billing_queries as q;
use super::rows::{db_error, unique_violation};

/// PostgreSQL implementation of the billing repository ports.
#[derive(Clone)]
pub struct PostgresBillingRepository {
    pool: PgPool,
}

impl PostgresBillingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for PostgresBillingRepository {
    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        q::find_subscription_by_id(&self.pool, id).await
    }

    async fn find_active_by_user_id(&self, user_id: &UserId) -> Result<Option<Subscription>, DomainError> {
        q::find_active_subscription_by_user(&self.pool, user_id).await
    }

    async fn find_by_provider_subscription_id(
        &self,
        provider: Provider,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        q::find_subscription_by_provider_id(&self.pool, provider, provider_subscription_id).await
    }

    async fn find_past_due(&self) -> Result<Vec<Subscription>, DomainError> {
        q::find_past_due_subscriptions(&self.pool).await
    }

    async fn create(&self, subscription: &Subscription) -> Result<(), DomainError> {
        q::insert_subscription(&self.pool, subscription).await
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        q::update_subscription(&self.pool, subscription).await
    }

    async fn update_if_status(
        &self,
        subscription: &Subscription,
        expected: SubscriptionStatus,
    ) -> Result<bool, DomainError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| db_error("Failed to acquire connection", e))?;
        q::update_subscription_if_status(&mut conn, subscription, expected).await
    }
}

#[async_trait]
impl CustomerMappingRepository for PostgresBillingRepository {
    async fn find_by_provider_customer_id(
        &self,
        provider: Provider,
        provider_customer_id: &str,
    ) -> Result<Option<CustomerMapping>, DomainError> {
        q::find_customer_mapping(&self.pool, provider, provider_customer_id).await
    }

    async fn create(&self, mapping: &CustomerMapping) -> Result<(), DomainError> {
        q::insert_customer_mapping(&self.pool, mapping).await
    }
}

#[async_trait]
impl InvoiceRepository for PostgresBillingRepository {
    async fn upsert(&self, invoice: &Invoice) -> Result<Invoice, DomainError> {
        q::upsert_invoice(&self.pool, invoice).await
    }

    async fn find_by_provider_invoice_id(
        &self,
        provider: Provider,
        provider_invoice_id: &str,
    ) -> Result<Option<Invoice>, DomainError> {
        q::find_invoice(&self.pool, provider, provider_invoice_id).await
    }
}

#[async_trait]
impl BillingEventRepository for PostgresBillingRepository {
    async fn was_processed(&self, provider: Provider, provider_event_id: &str) -> Result<bool, DomainError> {
        q::billing_event_exists(&self.pool, provider, provider_event_id).await
    }

    async fn record_event(&self, event: &BillingEvent) -> Result<SaveResult, DomainError> {
        q::insert_billing_event(&self.pool, event).await
    }

    async fn delete_before(&self, timestamp: Timestamp) -> Result<u64, DomainError> {
        q::delete_billing_events_before(&self.pool, timestamp).await
    }
}

#[async_trait]
impl BillingUnitOfWork for PostgresBillingRepository {
    async fn begin(&self) -> Result<Box<dyn BillingTransaction>, DomainError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;
        Ok(Box::new(PostgresBillingTransaction { tx: Mutex::new(tx) }))
    }
}

/// One open database transaction.
///
/// Statements are serialized through the mutex; the connection is never
/// shared with the pool until commit or rollback.
pub struct PostgresBillingTransaction {
    tx: Mutex<Transaction<'static, Postgres>>,
}

#[async_trait]
impl BillingTransaction for PostgresBillingTransaction {
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
        self.tx.into_inner().commit().await.map_err(|e| {
            if unique_violation(&e).as_deref() == Some(q::BILLING_EVENT_UNIQUE) {
                return DomainError::new(
                    ErrorCode::DuplicateEvent,
                    "Billing event was committed concurrently",
                );
            }
            db_error("Failed to commit transaction", e)
        })
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx
            .into_inner()
            .rollback()
            .await
            .map_err(|e| db_error("Failed to roll back transaction", e))
    }
}

#[async_trait]
impl SubscriptionRepository for PostgresBillingTransaction {
    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        let mut tx = self.tx.lock().await;
        q::find_subscription_by_id(&mut **tx, id).await
    }

    async fn find_active_by_user_id(&self, user_id: &UserId) -> Result<Option<Subscription>, DomainError> {
        let mut tx = self.tx.lock().await;
        q::find_active_subscription_by_user(&mut **tx, user_id).await
    }

    async fn find_by_provider_subscription_id(
        &self,
        provider: Provider,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let mut tx = self.tx.lock().await;
        q::find_subscription_by_provider_id(&mut **tx, provider, provider_subscription_id).await
    }

    async fn find_past_due(&self) -> Result<Vec<Subscription>, DomainError> {
        let mut tx = self.tx.lock().await;
        q::find_past_due_subscriptions(&mut **tx).await
    }

    async fn create(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut tx = self.tx.lock().await;
        q::insert_subscription(&mut **tx, subscription).await
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut tx = self.tx.lock().await;
        q::update_subscription(&mut **tx, subscription).await
    }

    async fn update_if_status(
        &self,
        subscription: &Subscription,
        expected: SubscriptionStatus,
    ) -> Result<bool, DomainError> {
        let mut tx = self.tx.lock().await;
        q::update_subscription_if_status(&mut **tx, subscription, expected).await
    }
}

#[async_trait]
impl CustomerMappingRepository for PostgresBillingTransaction {
    async fn find_by_provider_customer_id(
        &self,
        provider: Provider,
        provider_customer_id: &str,
    ) -> Result<Option<CustomerMapping>, DomainError> {
        let mut tx = self.tx.lock().await;
        q::find_customer_mapping(&mut **tx, provider, provider_customer_id).await
    }

    async fn create(&self, mapping: &CustomerMapping) -> Result<(), DomainError> {
        let mut tx = self.tx.lock().await;
        q::insert_customer_mapping(&mut **tx, mapping).await
    }
}

#[async_trait]
impl InvoiceRepository for PostgresBillingTransaction {
    async fn upsert(&self, invoice: &Invoice) -> Result<Invoice, DomainError> {
        let mut tx = self.tx.lock().await;
        q::upsert_invoice(&mut **tx, invoice).await
    }

    async fn find_by_provider_invoice_id(
        &self,
        provider: Provider,
        provider_invoice_id: &str,
    ) -> Result<Option<Invoice>, DomainError> {
        let mut tx = self.tx.lock().await;
        q::find_invoice(&mut **tx, provider, provider_invoice_id).await
    }
}

#[async_trait]
impl BillingEventRepository for PostgresBillingTransaction {
    async fn was_processed(&self, provider: Provider, provider_event_id: &str) -> Result<bool, DomainError> {
        let mut tx = self.tx.lock().await;
        q::billing_event_exists(&mut **tx, provider, provider_event_id).await
    }

    async fn record_event(&self, event: &BillingEvent) -> Result<SaveResult, DomainError> {
        let mut tx = self.tx.lock().await;
        q::insert_billing_event(&mut **tx, event).await
    }

    async fn delete_before(&self, timestamp: Timestamp) -> Result<u64, DomainError> {
        let mut tx = self.tx.lock().await;
        q::delete_billing_events_before(&mut **tx, timestamp).await
    }
}
