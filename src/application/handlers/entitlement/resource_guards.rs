//! ResourceGuards - enforce plan limits for storage, seats and generic usage.
//!
//! Each guard resolves entitlements, reads one feature, and only then asks
//! the caller-supplied counter for current consumption. Unlimited features
//! never invoke the counter.
//!
//! Comparison rules:
//!
//! - with a requested amount: exceeded when `current + requested > limit`
//! - without one (seats, plain counts): exceeded when `current >= limit`

use std::future::Future;
use std::sync::Arc;

use crate::domain::entitlement::{
    feature_keys, EntitlementError, FeatureEntitlement, ForbiddenCode, LimitUsage, SeatUsage,
    StorageUsage, BYTES_PER_MB,
};
use crate::domain::foundation::{DomainError, TenantId, UserId};
use crate::ports::MembershipRepository;

use super::EntitlementService;

pub struct ResourceGuards {
    entitlements: Arc<EntitlementService>,
    memberships: Arc<dyn MembershipRepository>,
}

impl ResourceGuards {
    pub fn new(entitlements: Arc<EntitlementService>, memberships: Arc<dyn MembershipRepository>) -> Self {
        Self {
            entitlements,
            memberships,
        }
    }

    /// Generic limit check for `feature_key`.
    ///
    /// # Errors
    ///
    /// - `Forbidden(FEATURE_NOT_ENTITLED)` when the feature is absent or disabled
    /// - `Forbidden(LIMIT_EXCEEDED)` when the limit would be exceeded
    pub async fn assert_usage_within_limit<F, Fut>(
        &self,
        user_id: &UserId,
        feature_key: &str,
        requested: Option<i64>,
        counter: F,
    ) -> Result<(), EntitlementError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<i64, DomainError>>,
    {
        let feature = self.entitled_feature(user_id, feature_key).await?;
        let Some(limit) = feature.limit else {
            return Ok(());
        };

        let current = counter().await?;
        if exceeds(current, requested, limit) {
            return Err(EntitlementError::forbidden(
                ForbiddenCode::LimitExceeded,
                format!(
                    "Usage limit for '{}' exceeded: current {}{}, limit {}",
                    feature_key,
                    current,
                    requested_suffix(requested),
                    limit
                ),
            ));
        }
        Ok(())
    }

    /// Storage check; the plan limit is in MB, the counter reports bytes.
    ///
    /// # Errors
    ///
    /// - `Forbidden(FEATURE_NOT_ENTITLED)` when storage is not part of the plan
    /// - `Forbidden(STORAGE_LIMIT_EXCEEDED)` when `current + additional` exceeds the limit
    pub async fn assert_storage_limit<F, Fut>(
        &self,
        user_id: &UserId,
        additional_bytes: i64,
        counter: F,
    ) -> Result<(), EntitlementError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<i64, DomainError>>,
    {
        let feature = self.entitled_feature(user_id, feature_keys::STORAGE).await?;
        let Some(limit_mb) = feature.limit else {
            return Ok(());
        };
        let limit_bytes = limit_mb.saturating_mul(BYTES_PER_MB);

        let current = counter().await?;
        if exceeds(current, Some(additional_bytes), limit_bytes) {
            return Err(EntitlementError::forbidden(
                ForbiddenCode::StorageLimitExceeded,
                format!(
                    "Storage limit exceeded: current {} bytes + {} bytes, limit {} bytes ({} MB)",
                    current, additional_bytes, limit_bytes, limit_mb
                ),
            ));
        }
        Ok(())
    }

    /// Seat check before adding one member to `tenant_id`.
    ///
    /// # Errors
    ///
    /// - `Forbidden(FEATURE_NOT_ENTITLED)` when seats are not part of the plan
    /// - `Forbidden(SEAT_LIMIT_EXCEEDED)` when every seat is taken
    pub async fn assert_seat_limit(
        &self,
        user_id: &UserId,
        tenant_id: &TenantId,
    ) -> Result<(), EntitlementError> {
        let feature = self.entitled_feature(user_id, feature_keys::SEATS).await?;
        let Some(limit) = feature.limit else {
            return Ok(());
        };

        let current = self.memberships.count_by_tenant_id(tenant_id).await?;
        if exceeds(current, None, limit) {
            return Err(EntitlementError::forbidden(
                ForbiddenCode::SeatLimitExceeded,
                format!("Seat limit reached: {} of {} seats used", current, limit),
            ));
        }
        Ok(())
    }

    /// Never fails on entitlement; see [`LimitUsage`].
    pub async fn get_usage<F, Fut>(
        &self,
        user_id: &UserId,
        feature_key: &str,
        counter: F,
    ) -> Result<LimitUsage, EntitlementError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<i64, DomainError>>,
    {
        let resolved = self.entitlements.resolve_entitlements_for_user(user_id).await?;
        let current = counter().await?;
        Ok(LimitUsage::compute(current, resolved.feature(feature_key)))
    }

    pub async fn get_storage_usage<F, Fut>(
        &self,
        user_id: &UserId,
        counter: F,
    ) -> Result<StorageUsage, EntitlementError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<i64, DomainError>>,
    {
        let resolved = self.entitlements.resolve_entitlements_for_user(user_id).await?;
        let current = counter().await?;
        Ok(StorageUsage::compute(
            current,
            resolved.feature(feature_keys::STORAGE),
        ))
    }

    pub async fn get_seat_usage(
        &self,
        user_id: &UserId,
        tenant_id: &TenantId,
    ) -> Result<SeatUsage, EntitlementError> {
        let resolved = self.entitlements.resolve_entitlements_for_user(user_id).await?;
        let current = self.memberships.count_by_tenant_id(tenant_id).await?;
        Ok(LimitUsage::compute(current, resolved.feature(feature_keys::SEATS)).into())
    }

    async fn entitled_feature(
        &self,
        user_id: &UserId,
        feature_key: &str,
    ) -> Result<FeatureEntitlement, EntitlementError> {
        let resolved = self.entitlements.resolve_entitlements_for_user(user_id).await?;
        match resolved.feature(feature_key) {
            Some(feature) if feature.enabled => Ok(*feature),
            _ => Err(EntitlementError::forbidden(
                ForbiddenCode::FeatureNotEntitled,
                format!(
                    "Feature '{}' is not included for subscription state {}",
                    feature_key, resolved.subscription_state
                ),
            )),
        }
    }
}

fn exceeds(current: i64, requested: Option<i64>, limit: i64) -> bool {
    match requested {
        Some(amount) => current.saturating_add(amount) > limit,
        None => current >= limit,
    }
}

fn requested_suffix(requested: Option<i64>) -> String {
    requested
        .map(|amount| format!(" + requested {}", amount))
        .unwrap_or_default()
}
