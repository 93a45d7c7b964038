//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresBillingRepository` - subscriptions, customer mappings,
//!   invoices, the idempotency ledger and the billing unit of work
//! - `PostgresUsageRepository` - usage metric catalog and snapshots
//! - `PostgresMembershipRepository` - tenant seats
//!
//! Schema lives in `migrations/`; run it with [`run_migrations`].

mod billing_queries;
mod billing_repository;
mod membership_repository;
mod rows;
mod usage_repository;

pub use billing_repository::{PostgresBillingRepository, PostgresBillingTransaction};
pub use membership_repository::PostgresMembershipRepository;
pub use usage_repository::PostgresUsageRepository;

use sqlx::PgPool;

use crate::domain::foundation::DomainError;

/// Applies pending schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DomainError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DomainError::database(format!("Migration failed: {}", e)))
}
