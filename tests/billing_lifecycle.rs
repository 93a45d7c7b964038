//! Lifecycle state machine properties and the dunning flow end to end.

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;

use billing_engine::adapters::memory::InMemoryBillingStore;
use billing_engine::adapters::payment::MockSubscriptionGateway;
use billing_engine::application::DunningManager;
use billing_engine::domain::billing::{
    CancelReason, LifecycleEvent, LifecycleState, NewSubscription, Provider, Subscription,
    SubscriptionStatus,
};
use billing_engine::domain::foundation::{PlanId, StateMachine, Timestamp, UserId};
use billing_engine::ports::{PaymentError, PaymentErrorCode, SubscriptionGateways};

fn state() -> impl Strategy<Value = LifecycleState> {
    proptest::sample::select(LifecycleState::ALL.to_vec())
}

fn event() -> impl Strategy<Value = LifecycleEvent> {
    proptest::sample::select(LifecycleEvent::ALL.to_vec())
}

fn edge_target(from: LifecycleState, event: LifecycleEvent) -> Option<LifecycleState> {
    LifecycleState::edges()
        .iter()
        .find(|(f, e, _)| *f == from && *e == event)
        .map(|(_, _, to)| *to)
}

proptest! {
    #[test]
    fn transition_follows_edge_table(from in state(), ev in event()) {
        let result = from.transition(ev);
        match edge_target(from, ev) {
            Some(to) => {
                prop_assert!(result.valid);
                prop_assert_eq!(result.state, to);
                prop_assert_eq!(from.apply(ev).unwrap(), to);
            }
            None => {
                prop_assert!(!result.valid);
                prop_assert_eq!(result.state, from);
                prop_assert!(from.apply(ev).is_err());
            }
        }
    }

    #[test]
    fn event_sequences_never_leave_canceled(events in proptest::collection::vec(event(), 0..20)) {
        let mut current = LifecycleState::Canceled;
        for ev in events {
            current = current.transition(ev).state;
            prop_assert_eq!(current, LifecycleState::Canceled);
        }
    }

    #[test]
    fn valid_events_are_exactly_the_accepted_ones(from in state()) {
        let accepted: Vec<LifecycleEvent> = LifecycleEvent::ALL
            .into_iter()
            .filter(|ev| from.transition(*ev).valid)
            .collect();
        let mut listed = from.valid_events();
        listed.sort_by_key(|ev| format!("{:?}", ev));
        let mut expected = accepted;
        expected.sort_by_key(|ev| format!("{:?}", ev));
        prop_assert_eq!(listed, expected);
    }
}

#[test]
fn edge_table_has_eleven_edges() {
    assert_eq!(LifecycleState::edges().len(), 11);
    assert!(LifecycleState::Canceled.is_terminal());
}

// ══════════════════════════════════════════════════════════════
// Dunning Flow
// ══════════════════════════════════════════════════════════════

fn active_subscription(provider_id: &str, now: Timestamp) -> Subscription {
    Subscription::create(
        NewSubscription {
            user_id: UserId::new("user-dunning").unwrap(),
            plan_id: PlanId::new("pro_monthly").unwrap(),
            provider: Provider::Stripe,
            provider_subscription_id: provider_id.to_string(),
            provider_customer_id: "cus_dunning".to_string(),
            status: SubscriptionStatus::Active,
            current_period_start: None,
            current_period_end: None,
            trial_end: None,
            metadata: HashMap::new(),
        },
        now,
    )
}

fn manager(store: &InMemoryBillingStore, gateway: Arc<MockSubscriptionGateway>) -> DunningManager {
    DunningManager::new(Arc::new(store.clone()), SubscriptionGateways::new().with(gateway))
        .with_grace_period_days(14)
}

#[tokio::test]
async fn past_due_subscription_is_canceled_after_grace_period() {
    let store = InMemoryBillingStore::new();
    let gateway = Arc::new(MockSubscriptionGateway::new(Provider::Stripe));
    let dunning = manager(&store, gateway.clone());
    store
        .insert_subscription(active_subscription("sub_dun_1", Timestamp::now()))
        .await;

    let failure = dunning
        .handle_payment_failure("sub_dun_1", Provider::Stripe)
        .await
        .unwrap();
    assert_eq!(failure.new_status, Some(SubscriptionStatus::PastDue));

    let failed_at = store.subscription_by_provider_id("sub_dun_1").await.unwrap().updated_at;

    let early = dunning
        .process_grace_period_expiry(14, failed_at.add_days(10))
        .await
        .unwrap();
    assert_eq!(early.checked, 1);
    assert_eq!(early.canceled, 0);
    assert_eq!(early.still_in_grace_period, 1);
    assert!(gateway.cancel_calls().is_empty());

    let late = dunning
        .process_grace_period_expiry(14, failed_at.add_days(15))
        .await
        .unwrap();
    assert_eq!(late.canceled, 1);
    assert_eq!(late.still_in_grace_period, 0);

    let sub = store.subscription_by_provider_id("sub_dun_1").await.unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Canceled);
    assert_eq!(sub.cancel_reason, Some(CancelReason::GracePeriodExpired));
    assert!(sub.canceled_at.is_some());
    assert!(sub.dunning.is_none());
    assert_eq!(late.canceled_ids, vec![sub.id]);
    assert_eq!(gateway.cancel_calls(), vec![("sub_dun_1".to_string(), true)]);

    // Nothing left to sweep.
    let after = dunning
        .process_grace_period_expiry(14, failed_at.add_days(30))
        .await
        .unwrap();
    assert_eq!(after.checked, 0);
}

#[tokio::test]
async fn recovery_inside_grace_period_keeps_subscription() {
    let store = InMemoryBillingStore::new();
    let dunning = manager(&store, Arc::new(MockSubscriptionGateway::new(Provider::Stripe)));
    store
        .insert_subscription(active_subscription("sub_dun_2", Timestamp::now()))
        .await;

    dunning
        .handle_payment_failure("sub_dun_2", Provider::Stripe)
        .await
        .unwrap();
    let success = dunning
        .handle_payment_success("sub_dun_2", Provider::Stripe)
        .await
        .unwrap();
    assert_eq!(success.previous_status, Some(SubscriptionStatus::PastDue));
    assert_eq!(success.new_status, Some(SubscriptionStatus::Active));

    let sweep = dunning
        .process_grace_period_expiry(14, Timestamp::now().add_days(30))
        .await
        .unwrap();
    assert_eq!(sweep.checked, 0);

    let sub = store.subscription_by_provider_id("sub_dun_2").await.unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn provider_cancel_failure_still_cancels_locally() {
    let store = InMemoryBillingStore::new();
    let gateway = Arc::new(
        MockSubscriptionGateway::new(Provider::Stripe)
            .failing_with(PaymentError::new(
                PaymentErrorCode::ProviderError,
                "provider unavailable",
            )),
    );
    let dunning = manager(&store, gateway.clone());
    store
        .insert_subscription(active_subscription("sub_dun_3", Timestamp::now()))
        .await;
    dunning
        .handle_payment_failure("sub_dun_3", Provider::Stripe)
        .await
        .unwrap();

    let sweep = dunning
        .process_grace_period_expiry(14, Timestamp::now().add_days(15))
        .await
        .unwrap();

    assert_eq!(sweep.canceled, 1);
    assert_eq!(gateway.cancel_calls().len(), 1);
    let sub = store.subscription_by_provider_id("sub_dun_3").await.unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Canceled);
}

#[tokio::test]
async fn unknown_subscription_failure_is_not_processed() {
    let store = InMemoryBillingStore::new();
    let dunning = manager(&store, Arc::new(MockSubscriptionGateway::new(Provider::Stripe)));

    let result = dunning
        .handle_payment_failure("sub_missing", Provider::Stripe)
        .await
        .unwrap();

    assert!(!result.processed);
    assert_eq!(result.new_status, None);
}
