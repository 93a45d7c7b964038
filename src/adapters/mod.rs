//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `memory` - In-memory repositories and catalog (tests, single process)
//! - `payment` - Stripe and PayPal webhook adapters, mock gateway
//! - `postgres` - sqlx-backed repositories and unit of work

pub mod memory;
pub mod payment;
pub mod postgres;

pub use memory::{Catalog, InMemoryBillingStore, InMemoryMemberships, InMemoryPlanCatalog, InMemoryUsageStore};
pub use payment::{
    MockSubscriptionGateway, PaypalWebhookAdapter, PaypalWebhookConfig, StripeWebhookAdapter,
    StripeWebhookConfig,
};
pub use postgres::{PostgresBillingRepository, PostgresMembershipRepository, PostgresUsageRepository};
