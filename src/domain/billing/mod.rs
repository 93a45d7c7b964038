//! Billing domain module.
//!
//! Subscriptions, plans, invoices, the idempotency ledger and the
//! subscription lifecycle state machine.

mod billing_event;
mod customer_mapping;
mod errors;
mod grace_period;
mod invoice;
mod lifecycle;
mod plan;
mod provider;
mod status;
mod subscription;
mod webhook_errors;
mod webhook_event;

pub use billing_event::BillingEvent;
pub use customer_mapping::CustomerMapping;
pub use errors::{DunningError, SubscriptionError};
pub use grace_period::{GracePeriodStatus, DEFAULT_GRACE_PERIOD_DAYS};
pub use invoice::{Invoice, InvoiceStatus};
pub use lifecycle::{LifecycleEvent, LifecycleState};
pub use plan::{BillingInterval, Plan, PlanFeature};
pub use provider::Provider;
pub use status::SubscriptionStatus;
pub use subscription::{CancelReason, DunningInfo, NewSubscription, Subscription};
pub use webhook_errors::WebhookError;
pub use webhook_event::{NormalizedWebhookEvent, WebhookEventData, WebhookEventType};
