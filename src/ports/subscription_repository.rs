//! Subscription repository port.
//!
//! Defines the contract for persisting and retrieving Subscription
//! aggregates. Subscriptions are never deleted, so there is no delete.

use async_trait::async_trait;

use crate::domain::billing::{Provider, Subscription, SubscriptionStatus};
use crate::domain::foundation::{DomainError, SubscriptionId, UserId};

/// Repository port for Subscription aggregate persistence.
///
/// Implementations must enforce uniqueness of
/// `(provider, provider_subscription_id)`.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Find a subscription by its ID.
    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError>;

    /// The user's live (trialing, active or past_due) subscription, if any.
    async fn find_active_by_user_id(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Find by the provider's own subscription id.
    async fn find_by_provider_subscription_id(
        &self,
        provider: Provider,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Every subscription currently in past_due.
    async fn find_past_due(&self) -> Result<Vec<Subscription>, DomainError>;

    /// Insert a new subscription.
    ///
    /// # Errors
    ///
    /// - `SubscriptionExists` if the provider subscription id is taken
    /// - `DatabaseError` on persistence failure
    async fn create(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Update an existing subscription.
    ///
    /// # Errors
    ///
    /// - `SubscriptionNotFound` if it doesn't exist
    /// - `DatabaseError` on persistence failure
    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Update only while the stored row still has status `expected`.
    ///
    /// Returns `false` without writing when a concurrent change moved the
    /// row to another status.
    ///
    /// # Errors
    ///
    /// - `SubscriptionNotFound` if it doesn't exist
    /// - `DatabaseError` on persistence failure
    async fn update_if_status(
        &self,
        subscription: &Subscription,
        expected: SubscriptionStatus,
    ) -> Result<bool, DomainError>;
}
