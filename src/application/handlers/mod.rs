//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod billing;
pub mod entitlement;
pub mod subscription;
pub mod usage;

pub use billing::{
    DunningManager, GracePeriodExpiryResult, PaymentFailureResult, PaymentSuccessResult,
    PaymentTransitionResult, WebhookProcessor, WebhookResult,
};
pub use entitlement::{EntitlementService, ResourceGuards};
pub use subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
    CreateSubscriptionCommand, CreateSubscriptionHandler, CreateSubscriptionResult,
    ResumeSubscriptionCommand, ResumeSubscriptionHandler,
};
pub use usage::{RecordUsageCommand, UsageMeteringService};
