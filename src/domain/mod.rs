//! Domain layer - Pure business logic with no external dependencies.

pub mod billing;
pub mod entitlement;
pub mod foundation;
pub mod usage;
