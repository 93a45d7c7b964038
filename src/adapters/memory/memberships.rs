//! In-memory tenant memberships.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, MembershipId, TenantId, Timestamp, UserId};
use crate::ports::{MembershipRepository, TenantMembership};

#[derive(Clone, Default)]
pub struct InMemoryMemberships {
    members: Arc<RwLock<Vec<TenantMembership>>>,
}

impl InMemoryMemberships {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `user_id` to `tenant_id` with the `member` role.
    pub async fn add_member(&self, tenant_id: &TenantId, user_id: &UserId) -> TenantMembership {
        let membership = TenantMembership {
            id: MembershipId::new(),
            tenant_id: tenant_id.clone(),
            user_id: user_id.clone(),
            role: "member".to_string(),
            created_at: Timestamp::now(),
        };
        self.members.write().await.push(membership.clone());
        membership
    }
}

#[async_trait]
impl MembershipRepository for InMemoryMemberships {
    async fn find_by_tenant_id(&self, tenant_id: &TenantId) -> Result<Vec<TenantMembership>, DomainError> {
        Ok(self
            .members
            .read()
            .await
            .iter()
            .filter(|m| &m.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}
