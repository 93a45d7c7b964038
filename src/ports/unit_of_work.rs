//! Transactional unit of work over the billing repositories.
//!
//! A transaction yields repository handles whose writes become visible
//! together on `commit` and are discarded on `rollback` (or drop).
//!
//! # Example
//!
//! ```ignore
//! let tx = uow.begin().await?;
//! tx.subscriptions().update(&subscription).await?;
//! match tx.billing_events().record_event(&event).await? {
//!     SaveResult::Inserted => tx.commit().await?,
//!     SaveResult::AlreadyExists => tx.rollback().await?,
//! }
//! ```

use async_trait::async_trait;

use crate::domain::foundation::DomainError;

use super::{
    BillingEventRepository, CustomerMappingRepository, InvoiceRepository, SubscriptionRepository,
};

/// Transaction-scoped repositories.
#[async_trait]
pub trait BillingTransaction: Send + Sync {
    fn subscriptions(&self) -> &dyn SubscriptionRepository;

    fn customer_mappings(&self) -> &dyn CustomerMappingRepository;

    fn invoices(&self) -> &dyn InvoiceRepository;

    fn billing_events(&self) -> &dyn BillingEventRepository;

    /// Makes every write visible atomically.
    ///
    /// # Errors
    ///
    /// - `DuplicateEvent` if a concurrent transaction recorded the same
    ///   billing event first
    /// - `DatabaseError` on persistence failure
    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    /// Discards every write.
    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}

/// Opens billing transactions.
#[async_trait]
pub trait BillingUnitOfWork: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn BillingTransaction>, DomainError>;
}
