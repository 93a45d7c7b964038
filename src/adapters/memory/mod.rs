//! In-memory adapters.
//!
//! Used by the test suite and for single-process runs. Nothing here
//! persists across restarts.

mod billing_store;
mod catalog;
mod memberships;
mod usage_store;

pub use billing_store::{InMemoryBillingStore, InMemoryBillingTransaction};
pub use catalog::{Catalog, InMemoryPlanCatalog};
pub use memberships::InMemoryMemberships;
pub use usage_store::InMemoryUsageStore;
