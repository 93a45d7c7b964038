//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Repository Ports
//!
//! - `SubscriptionRepository`, `PlanRepository`, `CustomerMappingRepository`,
//!   `InvoiceRepository` - billing records
//! - `BillingEventRepository` - webhook idempotency ledger
//! - `UsageMetricRepository`, `UsageSnapshotRepository` - usage metering
//! - `MembershipRepository` - tenant seats
//! - `BillingUnitOfWork` - transaction-scoped access to the billing records
//!
//! ## Provider Ports
//!
//! - `ProviderWebhookAdapter` - webhook verification and normalization
//! - `SubscriptionGateway` - outbound cancel/resume

mod billing_event_repository;
mod customer_mapping_repository;
mod invoice_repository;
mod membership_repository;
mod payment_provider;
mod plan_repository;
mod subscription_repository;
mod unit_of_work;
mod usage_repository;

pub use billing_event_repository::{BillingEventRepository, SaveResult};
pub use customer_mapping_repository::CustomerMappingRepository;
pub use invoice_repository::InvoiceRepository;
pub use membership_repository::{MembershipRepository, TenantMembership};
pub use payment_provider::{
    PaymentError, PaymentErrorCode, ProviderWebhookAdapter, SubscriptionGateway,
    SubscriptionGateways,
};
pub use plan_repository::PlanRepository;
pub use subscription_repository::SubscriptionRepository;
pub use unit_of_work::{BillingTransaction, BillingUnitOfWork};
pub use usage_repository::{UsageMetricRepository, UsageSnapshotRepository};
