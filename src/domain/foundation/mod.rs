//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, the state machine trait and error
//! types that form the vocabulary of the billing domain.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{
    BillingEventId, CustomerMappingId, InvoiceId, MembershipId, PlanId, SubscriptionId,
    TenantId, UserId,
};
pub use state_machine::{StateMachine, TransitionResult};
pub use timestamp::Timestamp;
