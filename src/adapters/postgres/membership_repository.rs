//! PostgreSQL implementation of MembershipRepository.
//!
//! Tenant seats are rows in `tenant_memberships`; the seat count is a
//! `COUNT(*)` rather than a materialized list.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, TenantId};
use crate::ports::{MembershipRepository, TenantMembership};

use super::rows::{db_error, TenantMembershipRow};

pub struct PostgresMembershipRepository {
    pool: PgPool,
}

impl PostgresMembershipRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipRepository for PostgresMembershipRepository {
    async fn find_by_tenant_id(&self, tenant_id: &TenantId) -> Result<Vec<TenantMembership>, DomainError> {
        let rows: Vec<TenantMembershipRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, user_id, role, created_at
            FROM tenant_memberships
            WHERE tenant_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(tenant_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list tenant memberships", e))?;

        rows.into_iter().map(TenantMembership::try_from).collect()
    }

    async fn count_by_tenant_id(&self, tenant_id: &TenantId) -> Result<i64, DomainError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM tenant_memberships WHERE tenant_id = $1")
            .bind(tenant_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to count tenant memberships", e))
    }
}
