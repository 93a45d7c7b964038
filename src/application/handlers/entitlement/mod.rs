//! Entitlement handlers.
//!
//! - `EntitlementService` - resolve a user's entitlements from storage
//! - `ResourceGuards` - storage, seat and generic usage limit checks

mod resolve_entitlements;
mod resource_guards;

pub use resolve_entitlements::EntitlementService;
pub use resource_guards::ResourceGuards;
