//! Billing handlers.
//!
//! ## Webhooks
//! - `WebhookProcessor` - verify, deduplicate and route provider events
//!
//! ## Dunning
//! - `DunningManager` - payment failure/success transitions and the
//!   grace-period sweep

mod dunning;
mod process_webhook;

pub use dunning::{
    DunningManager, GracePeriodExpiryResult, PaymentFailureResult, PaymentSuccessResult,
    PaymentTransitionResult,
};
pub use process_webhook::{WebhookProcessor, WebhookResult};
