//! Tenant membership port.
//!
//! Members of a tenant occupy seats. The seat guard only needs to count
//! them, so this is a read-only view.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DomainError, MembershipId, TenantId, Timestamp, UserId};

/// One user's seat in a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMembership {
    pub id: MembershipId,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: String,
    pub created_at: Timestamp,
}

#[async_trait]
pub trait MembershipRepository: Send + Sync {
    async fn find_by_tenant_id(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<TenantMembership>, DomainError>;

    /// Number of members; override when the store can count directly.
    async fn count_by_tenant_id(&self, tenant_id: &TenantId) -> Result<i64, DomainError> {
        Ok(self.find_by_tenant_id(tenant_id).await?.len() as i64)
    }
}
