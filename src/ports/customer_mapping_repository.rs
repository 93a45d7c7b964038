//! Customer mapping repository port.

use async_trait::async_trait;

use crate::domain::billing::{CustomerMapping, Provider};
use crate::domain::foundation::DomainError;

#[async_trait]
pub trait CustomerMappingRepository: Send + Sync {
    async fn find_by_provider_customer_id(
        &self,
        provider: Provider,
        provider_customer_id: &str,
    ) -> Result<Option<CustomerMapping>, DomainError>;

    /// # Errors
    ///
    /// - `ValidationFailed` if the provider customer id is already mapped
    /// - `DatabaseError` on persistence failure
    async fn create(&self, mapping: &CustomerMapping) -> Result<(), DomainError>;
}
