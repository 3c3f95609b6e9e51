//! Re-resolution sweep: transactions parked as `failed` get another pass
//! once the knowledge base learns their merchant, and their placeholder
//! orders are back-filled.

use std::sync::Arc;

use uuid::Uuid;

use rup_config::PlatformConfig;
use rup_ingest::BankFeedItem;
use rup_pipeline::Pipeline;
use rup_schemas::{Cents, MappingStatus, TxStatus};
use rup_store::{MemStore, Store};

fn feed_item(merchant: &str, amount: f64) -> BankFeedItem {
    BankFeedItem {
        amount,
        date: "2024-03-14".to_string(),
        description: format!("CARD PURCHASE {merchant}"),
        merchant_name: Some(merchant.to_string()),
        category: None,
    }
}

#[tokio::test]
async fn approved_mapping_recovers_a_failed_transaction() {
    let store = Arc::new(MemStore::new());
    let owner = Uuid::new_v4();
    let mut pipeline = Pipeline::new(store.clone(), PlatformConfig::default());

    // "STARBUCKS #1912" only substring-matches the brand table (0.80),
    // below the approval threshold: the mapping lands pending and the
    // transaction parks failed with a placeholder.
    let summary = pipeline
        .run_bank_sync(owner, &[feed_item("STARBUCKS #1912", 4.35)])
        .await
        .unwrap();
    assert_eq!(summary.success, 1);

    let txs = store.transactions_for_owner(owner).await.unwrap();
    assert_eq!(txs[0].status, TxStatus::Failed);
    let orders = store.orders_for_transaction(txs[0].id).await.unwrap();
    assert!(orders[0].ticker.is_none());

    let pending = store.pending_mappings().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].ticker, "SBUX");
    assert_eq!(pending[0].confidence, 0.80);

    // Human review approves the suggestion.
    store
        .set_mapping_status(pending[0].id, MappingStatus::Approved)
        .await
        .unwrap();

    let sweep = pipeline.run_re_resolution(owner).await.unwrap();
    assert_eq!(sweep.examined, 1);
    assert_eq!(sweep.resolved, 1);
    assert_eq!(sweep.backfilled_orders, 1);
    assert_eq!(sweep.still_unresolved, 0);

    let txs = store.transactions_for_owner(owner).await.unwrap();
    assert_eq!(txs[0].status, TxStatus::Mapped);
    assert_eq!(txs[0].ticker.as_deref(), Some("SBUX"));
    let orders = store.orders_for_transaction(txs[0].id).await.unwrap();
    assert_eq!(orders[0].ticker.as_deref(), Some("SBUX"));
    assert_eq!(orders[0].amount, Cents::new(65));

    let holdings = store.holdings_for_owner(owner).await.unwrap();
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0].total_value, Cents::new(65));
}

#[tokio::test]
async fn sweep_leaves_unknown_merchants_parked() {
    let store = Arc::new(MemStore::new());
    let owner = Uuid::new_v4();
    let mut pipeline = Pipeline::new(store.clone(), PlatformConfig::default());

    pipeline
        .run_bank_sync(owner, &[feed_item("Ed's Bait Shop", 7.25)])
        .await
        .unwrap();

    let sweep = pipeline.run_re_resolution(owner).await.unwrap();
    assert_eq!(sweep.examined, 1);
    assert_eq!(sweep.resolved, 0);
    assert_eq!(sweep.still_unresolved, 1);

    let txs = store.transactions_for_owner(owner).await.unwrap();
    assert_eq!(txs[0].status, TxStatus::Failed);
    // Nothing reached holdings.
    assert!(store.holdings_for_owner(owner).await.unwrap().is_empty());
}

#[tokio::test]
async fn repeated_sweeps_do_not_duplicate_a_pending_mapping() {
    let store = Arc::new(MemStore::new());
    let owner = Uuid::new_v4();
    let mut pipeline = Pipeline::new(store.clone(), PlatformConfig::default());

    pipeline
        .run_bank_sync(owner, &[feed_item("STARBUCKS #1912", 4.35)])
        .await
        .unwrap();
    assert_eq!(store.pending_mappings().await.unwrap().len(), 1);

    // Approval has not happened yet; sweeping twice must not pile more
    // copies of the same request onto the review queue.
    pipeline.run_re_resolution(owner).await.unwrap();
    pipeline.run_re_resolution(owner).await.unwrap();

    let pending = store.pending_mappings().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].ticker, "SBUX");
}

#[tokio::test]
async fn sweep_ignores_already_mapped_transactions() {
    let store = Arc::new(MemStore::new());
    let owner = Uuid::new_v4();
    let mut pipeline = Pipeline::new(store.clone(), PlatformConfig::default());

    pipeline
        .run_bank_sync(owner, &[feed_item("Starbucks", 4.35)])
        .await
        .unwrap();

    let sweep = pipeline.run_re_resolution(owner).await.unwrap();
    assert_eq!(sweep.examined, 0);
}

#[tokio::test]
async fn failed_queue_write_is_recovered_by_the_sweep() {
    let store = Arc::new(MemStore::new());
    let owner = Uuid::new_v4();
    let mut pipeline = Pipeline::new(store.clone(), PlatformConfig::default());

    // The resolution succeeds but the placeholder write fails: the ledger
    // entry survives and the transaction parks without any order.
    store.inject_order_insert_faults(1);
    let summary = pipeline
        .run_bank_sync(owner, &[feed_item("STARBUCKS #1912", 4.35)])
        .await
        .unwrap();
    assert_eq!(summary.success, 1, "the row itself still succeeded");
    assert_eq!(summary.queue_write_failures, 1);

    let txs = store.transactions_for_owner(owner).await.unwrap();
    assert!(store
        .ledger_entry_for_transaction(txs[0].id)
        .await
        .unwrap()
        .is_some());

    let pending = store.pending_mappings().await.unwrap();
    store
        .set_mapping_status(pending[0].id, MappingStatus::Approved)
        .await
        .unwrap();

    let sweep = pipeline.run_re_resolution(owner).await.unwrap();
    assert_eq!(sweep.resolved, 1);
    assert_eq!(sweep.backfilled_orders, 0, "there was no placeholder to fill");

    // The sweep queued the allocation directly instead.
    let orders = store.orders_for_transaction(txs[0].id).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].ticker.as_deref(), Some("SBUX"));
}
