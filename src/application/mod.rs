//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.

pub mod handlers;

pub use handlers::{
    // Billing
    DunningManager, GracePeriodExpiryResult, PaymentFailureResult, PaymentSuccessResult,
    PaymentTransitionResult, WebhookProcessor, WebhookResult,
    // Entitlements
    EntitlementService, ResourceGuards,
    // Subscriptions
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
    CreateSubscriptionCommand, CreateSubscriptionHandler, CreateSubscriptionResult,
    ResumeSubscriptionCommand, ResumeSubscriptionHandler,
    // Usage
    RecordUsageCommand, UsageMeteringService,
};
