//! Invoice repository port.

use async_trait::async_trait;

use crate::domain::billing::{Invoice, Provider};
use crate::domain::foundation::DomainError;

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Insert or update by `(provider, provider_invoice_id)`.
    ///
    /// An existing row keeps its `id` and `created_at`; every other field is
    /// overwritten. Returns the stored row.
    async fn upsert(&self, invoice: &Invoice) -> Result<Invoice, DomainError>;

    async fn find_by_provider_invoice_id(
        &self,
        provider: Provider,
        provider_invoice_id: &str,
    ) -> Result<Option<Invoice>, DomainError>;
}
