//! Entitlement resolution and resource guards over the shipped plan catalog.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use billing_engine::adapters::memory::{
    Catalog, InMemoryBillingStore, InMemoryMemberships, InMemoryPlanCatalog,
};
use billing_engine::application::{EntitlementService, ResourceGuards};
use billing_engine::domain::billing::{NewSubscription, Provider, Subscription, SubscriptionStatus};
use billing_engine::domain::entitlement::{feature_keys, ForbiddenCode, SubscriptionState, BYTES_PER_MB};
use billing_engine::domain::foundation::{DomainError, PlanId, TenantId, Timestamp, UserId};

const CATALOG: &str = include_str!("../catalog.yaml");

struct Fixture {
    store: InMemoryBillingStore,
    memberships: InMemoryMemberships,
    entitlements: Arc<EntitlementService>,
    guards: ResourceGuards,
}

fn fixture() -> Fixture {
    let catalog = Catalog::from_yaml(CATALOG).unwrap();
    let store = InMemoryBillingStore::new();
    let memberships = InMemoryMemberships::new();
    let entitlements = Arc::new(EntitlementService::new(
        Arc::new(store.clone()),
        Arc::new(InMemoryPlanCatalog::from_catalog(&catalog)),
    ));
    let guards = ResourceGuards::new(entitlements.clone(), Arc::new(memberships.clone()));
    Fixture {
        store,
        memberships,
        entitlements,
        guards,
    }
}

async fn subscribe(fixture: &Fixture, user: &str, plan: &str, status: SubscriptionStatus) -> UserId {
    let user_id = UserId::new(user).unwrap();
    fixture
        .store
        .insert_subscription(Subscription::create(
            NewSubscription {
                user_id: user_id.clone(),
                plan_id: PlanId::new(plan).unwrap(),
                provider: Provider::Stripe,
                provider_subscription_id: format!("sub_{}", user),
                provider_customer_id: format!("cus_{}", user),
                status,
                current_period_start: None,
                current_period_end: None,
                trial_end: None,
                metadata: HashMap::new(),
            },
            Timestamp::now(),
        ))
        .await;
    user_id
}

fn counter(value: i64) -> impl FnOnce() -> std::future::Ready<Result<i64, DomainError>> {
    move || std::future::ready(Ok(value))
}

// ══════════════════════════════════════════════════════════════
// Resolution
// ══════════════════════════════════════════════════════════════

#[tokio::test]
async fn user_without_subscription_gets_baseline_only() {
    let f = fixture();
    let resolved = f
        .entitlements
        .resolve_entitlements_for_user(&UserId::new("nobody").unwrap())
        .await
        .unwrap();

    assert_eq!(resolved.subscription_state, SubscriptionState::None);
    assert!(resolved.is_enabled(feature_keys::DASHBOARD));
    assert!(resolved.is_enabled(feature_keys::BILLING_PORTAL));
    assert!(!resolved.is_enabled(feature_keys::STORAGE));
    assert!(resolved.plan_id.is_none());
}

#[tokio::test]
async fn past_due_keeps_plan_features_and_gains_read_only() {
    let f = fixture();
    let user = subscribe(&f, "user-pd", "pro_monthly", SubscriptionStatus::PastDue).await;

    let resolved = f.entitlements.resolve_entitlements_for_user(&user).await.unwrap();

    assert!(resolved.is_enabled(feature_keys::READ_ONLY));
    assert!(resolved.is_enabled("priority_support"));
    assert_eq!(resolved.feature(feature_keys::SEATS).unwrap().limit, Some(10));
}

#[tokio::test]
async fn unknown_plan_degrades_to_baseline() {
    let f = fixture();
    let user = subscribe(&f, "user-ghost", "enterprise_legacy", SubscriptionStatus::Active).await;

    let resolved = f.entitlements.resolve_entitlements_for_user(&user).await.unwrap();

    assert!(resolved.is_enabled(feature_keys::DASHBOARD));
    assert!(resolved.feature(feature_keys::STORAGE).is_none());
    assert_eq!(resolved.plan_id, Some(PlanId::new("enterprise_legacy").unwrap()));
}

// ══════════════════════════════════════════════════════════════
// Storage Guard
// ══════════════════════════════════════════════════════════════

#[tokio::test]
async fn storage_guard_compares_bytes_against_mb_limit() {
    let f = fixture();
    let user = subscribe(&f, "user-st", "starter_monthly", SubscriptionStatus::Active).await;
    let limit = 1024 * BYTES_PER_MB;

    assert!(f
        .guards
        .assert_storage_limit(&user, BYTES_PER_MB, counter(limit - BYTES_PER_MB))
        .await
        .is_ok());

    let err = f
        .guards
        .assert_storage_limit(&user, 1, counter(limit))
        .await
        .unwrap_err();
    assert_eq!(err.forbidden_code(), Some(ForbiddenCode::StorageLimitExceeded));

    let report = f.guards.get_storage_usage(&user, counter(limit / 2)).await.unwrap();
    assert_eq!(report.max_bytes, Some(limit));
    assert_eq!(report.percent_used, Some(50));
    assert!(!report.at_limit);
}

#[tokio::test]
async fn canceled_subscription_is_not_entitled_to_storage() {
    let f = fixture();
    let user = subscribe(&f, "user-gone", "pro_monthly", SubscriptionStatus::Canceled).await;

    let err = f
        .guards
        .assert_storage_limit(&user, 1, counter(0))
        .await
        .unwrap_err();

    assert_eq!(err.forbidden_code(), Some(ForbiddenCode::FeatureNotEntitled));
    assert_eq!(err.status_code(), http::StatusCode::FORBIDDEN);
}

// ══════════════════════════════════════════════════════════════
// Seat Guard
// ══════════════════════════════════════════════════════════════

#[tokio::test]
async fn seat_guard_blocks_once_every_seat_is_taken() {
    let f = fixture();
    let owner = subscribe(&f, "user-owner", "starter_monthly", SubscriptionStatus::Active).await;
    let tenant = TenantId::new("tenant-seats").unwrap();

    for i in 0..2 {
        f.memberships
            .add_member(&tenant, &UserId::new(format!("member-{}", i)).unwrap())
            .await;
    }
    assert!(f.guards.assert_seat_limit(&owner, &tenant).await.is_ok());

    f.memberships
        .add_member(&tenant, &UserId::new("member-2").unwrap())
        .await;
    let err = f.guards.assert_seat_limit(&owner, &tenant).await.unwrap_err();
    assert_eq!(err.forbidden_code(), Some(ForbiddenCode::SeatLimitExceeded));

    let usage = f.guards.get_seat_usage(&owner, &tenant).await.unwrap();
    assert_eq!(usage.current_seats, 3);
    assert_eq!(usage.max_seats, Some(3));
    assert!(usage.at_limit);
}

#[tokio::test]
async fn seat_usage_without_subscription_reports_zero_seats() {
    let f = fixture();
    let tenant = TenantId::new("tenant-free").unwrap();
    for member in ["free-a", "free-b"] {
        f.memberships
            .add_member(&tenant, &UserId::new(member).unwrap())
            .await;
    }

    let usage = f
        .guards
        .get_seat_usage(&UserId::new("free-owner").unwrap(), &tenant)
        .await
        .unwrap();

    assert_eq!(usage.current_seats, 2);
    assert_eq!(usage.max_seats, Some(0));
    assert!(usage.at_limit);
}

// ══════════════════════════════════════════════════════════════
// Generic Limits
// ══════════════════════════════════════════════════════════════

#[tokio::test]
async fn unlimited_feature_never_calls_the_counter() {
    let f = fixture();
    let user = subscribe(&f, "user-yearly", "pro_yearly", SubscriptionStatus::Active).await;
    let calls = AtomicUsize::new(0);

    f.guards
        .assert_usage_within_limit(&user, "api_calls", Some(1_000_000), || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(0))
        })
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn limited_feature_rejects_request_that_would_overflow() {
    let f = fixture();
    let user = subscribe(&f, "user-api", "starter_monthly", SubscriptionStatus::Trialing).await;

    assert!(f
        .guards
        .assert_usage_within_limit(&user, "api_calls", Some(100), counter(9_900))
        .await
        .is_ok());

    let err = f
        .guards
        .assert_usage_within_limit(&user, "api_calls", Some(101), counter(9_900))
        .await
        .unwrap_err();
    assert_eq!(err.forbidden_code(), Some(ForbiddenCode::LimitExceeded));

    let missing = f
        .guards
        .assert_usage_within_limit(&user, "priority_support", None, counter(0))
        .await
        .unwrap_err();
    assert_eq!(missing.forbidden_code(), Some(ForbiddenCode::FeatureNotEntitled));
}

#[tokio::test]
async fn counter_failure_surfaces_as_infrastructure_error() {
    let f = fixture();
    let user = subscribe(&f, "user-db", "starter_monthly", SubscriptionStatus::Active).await;

    let err = f
        .guards
        .assert_storage_limit(&user, 1, || {
            std::future::ready(Err(DomainError::database("storage index unavailable")))
        })
        .await
        .unwrap_err();

    assert_eq!(err.forbidden_code(), None);
    assert_eq!(err.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
}
