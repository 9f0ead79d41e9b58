mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{Duration, Utc};

use afriflow::domain::TxStatus;
use afriflow::providers::ProviderAdapter;
use afriflow::services::Reconciler;
use afriflow::store::{EventKind, TransactionStore};

use common::{harness, pending_transaction, test_config, Behavior, MockAdapter, TestHarness};

fn reconciler_for(h: &TestHarness) -> Reconciler {
    let store: Arc<dyn TransactionStore> = h.store.clone();
    Reconciler::new(h.orchestrator.clone(), store, &test_config())
}

/// Inserts a pending row whose age puts it past the reconciliation grace
/// period.
async fn insert_stale(h: &TestHarness, tx_ref: &str, provider: &str, age_hours: i64) {
    let mut tx = pending_transaction(tx_ref, provider);
    tx.created_at = Utc::now() - Duration::hours(age_hours);
    tx.updated_at = tx.created_at;
    h.store.insert(&tx).await.unwrap();
}

#[tokio::test]
async fn test_stuck_pending_converges_to_provider_truth() {
    let adapter = Arc::new(MockAdapter::new("momo"));
    adapter.set_verify(Behavior::Report(TxStatus::Success));
    let h = harness(vec![(adapter, 10)]);
    insert_stale(&h, "MOMO_order1_1714000000", "momo", 1).await;

    let checked = reconciler_for(&h).run_once().await.unwrap();
    assert_eq!(checked, 1);

    let stored = h
        .store
        .get_by_tx_ref("MOMO_order1_1714000000")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, TxStatus::Success);
}

#[tokio::test]
async fn test_one_unreachable_provider_does_not_block_others() {
    let momo = Arc::new(MockAdapter::new("momo"));
    momo.set_verify(Behavior::Timeout);
    let cards = Arc::new(MockAdapter::new("cards"));
    cards.set_verify(Behavior::Report(TxStatus::Success));
    let h = harness(vec![
        (momo.clone() as Arc<dyn ProviderAdapter>, 10),
        (cards as Arc<dyn ProviderAdapter>, 20),
    ]);

    insert_stale(&h, "MOMO_order1_1714000000", "momo", 1).await;
    insert_stale(&h, "CARDS_order2_1714000000", "cards", 1).await;

    let checked = reconciler_for(&h).run_once().await.unwrap();
    assert_eq!(checked, 2);

    let momo_tx = h
        .store
        .get_by_tx_ref("MOMO_order1_1714000000")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(momo_tx.status, TxStatus::Pending);

    let cards_tx = h
        .store
        .get_by_tx_ref("CARDS_order2_1714000000")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cards_tx.status, TxStatus::Success);
}

#[tokio::test]
async fn test_fresh_pending_is_left_alone() {
    let adapter = Arc::new(MockAdapter::new("momo"));
    let h = harness(vec![(adapter.clone() as Arc<dyn ProviderAdapter>, 10)]);

    // Within the grace period: the customer may still be at the checkout.
    let tx = pending_transaction("MOMO_order1_1714000000", "momo");
    h.store.insert(&tx).await.unwrap();

    let checked = reconciler_for(&h).run_once().await.unwrap();
    assert_eq!(checked, 0);
    assert_eq!(adapter.verify_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_pending_past_max_age_is_failed_and_flagged() {
    let adapter = Arc::new(MockAdapter::new("momo"));
    let h = harness(vec![(adapter.clone() as Arc<dyn ProviderAdapter>, 10)]);
    // test_config caps pending age at 24 hours.
    insert_stale(&h, "MOMO_order1_1714000000", "momo", 48).await;

    reconciler_for(&h).run_once().await.unwrap();

    let stored = h
        .store
        .get_by_tx_ref("MOMO_order1_1714000000")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, TxStatus::Failed);
    // Escalation is an administrative decision, not a provider query.
    assert_eq!(adapter.verify_calls.load(Ordering::SeqCst), 0);

    let events = h
        .store
        .recent_events(Some(EventKind::ProviderUnreachable), 10)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tx_ref.as_deref(), Some("MOMO_order1_1714000000"));
}

#[tokio::test]
async fn test_recently_verified_row_is_on_cooldown() {
    let adapter = Arc::new(MockAdapter::new("momo"));
    let h = harness(vec![(adapter.clone() as Arc<dyn ProviderAdapter>, 10)]);
    insert_stale(&h, "MOMO_order1_1714000000", "momo", 1).await;

    let reconciler = reconciler_for(&h);

    // First pass verifies; the provider still says pending.
    assert_eq!(reconciler.run_once().await.unwrap(), 1);
    assert_eq!(adapter.verify_calls.load(Ordering::SeqCst), 1);

    // An immediate second pass skips the row: last_verified_at is within
    // the reconciliation interval.
    assert_eq!(reconciler.run_once().await.unwrap(), 0);
    assert_eq!(adapter.verify_calls.load(Ordering::SeqCst), 1);
}
