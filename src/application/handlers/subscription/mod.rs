//! Subscription handlers.
//!
//! ## Commands
//! - Creating subscriptions at checkout
//! - Cancelling (immediately or at period end)
//! - Resuming a scheduled cancellation

mod cancel_subscription;
mod create_subscription;
mod resume_subscription;

pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
};
pub use create_subscription::{
    CreateSubscriptionCommand, CreateSubscriptionHandler, CreateSubscriptionResult,
};
pub use resume_subscription::{ResumeSubscriptionCommand, ResumeSubscriptionHandler};
