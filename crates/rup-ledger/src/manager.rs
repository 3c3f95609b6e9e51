//! Ledger & Queue Manager.
//!
//! Advances a resolved (or still-unresolved) transaction into its financial
//! artifacts: exactly one pending ledger entry, one queued order per
//! allocation line (or a null-ticker placeholder), and the holdings fold.
//!
//! Failure semantics: ledger and queue writes are independent.  A failed
//! order insert is logged and counted — it never rolls back the ledger
//! entry and never blocks the remaining allocation lines.

use chrono::Utc;
use uuid::Uuid;

use rup_portfolio::Allocation;
use rup_schemas::{Cents, LedgerEntry, LedgerStatus, OrderStatus, QueuedOrder, Transaction};
use rup_store::{Store, StoreError};

/// Per-transaction result of queue writes, folded into the batch summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueWriteSummary {
    pub queued: usize,
    pub failed: usize,
}

pub struct LedgerQueueManager<'a> {
    store: &'a dyn Store,
}

impl<'a> LedgerQueueManager<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Write the transaction's ledger entry.  Idempotent on transaction id:
    /// returns `false` (and writes nothing) when an entry already exists.
    pub async fn record_ledger(&self, tx: &Transaction) -> Result<bool, StoreError> {
        let inserted = self
            .store
            .insert_ledger_entry(LedgerEntry {
                id: Uuid::new_v4(),
                transaction_id: tx.id,
                round_up: tx.round_up,
                fee: tx.fee,
                status: LedgerStatus::Pending,
                created_at: Utc::now(),
            })
            .await?;
        if !inserted {
            tracing::debug!(tx_id = %tx.id, "ledger entry already present; skipping");
        }
        Ok(inserted)
    }

    /// Queue one order per allocation line and fold each successful line
    /// into the owner's holdings.
    pub async fn queue_allocations(
        &self,
        tx: &Transaction,
        allocations: &[Allocation],
    ) -> QueueWriteSummary {
        let mut summary = QueueWriteSummary::default();

        for line in allocations {
            let order = QueuedOrder {
                id: Uuid::new_v4(),
                transaction_id: tx.id,
                ticker: Some(line.ticker.clone()),
                amount: line.amount,
                status: OrderStatus::Queued,
                created_at: Utc::now(),
            };
            match self.store.insert_queued_order(order).await {
                Ok(()) => {
                    summary.queued += 1;
                    // The holdings fold rides on the successful queue write;
                    // its own failure is logged but cannot un-queue the order.
                    if let Err(err) = self
                        .store
                        .add_to_holding(tx.owner_id, &line.ticker, line.amount)
                        .await
                    {
                        tracing::warn!(
                            tx_id = %tx.id,
                            ticker = %line.ticker,
                            error = %err,
                            "holding fold failed for queued order"
                        );
                    }
                }
                Err(err) => {
                    summary.failed += 1;
                    tracing::warn!(
                        tx_id = %tx.id,
                        ticker = %line.ticker,
                        amount = %line.amount,
                        error = %err,
                        "queued-order write failed; continuing with remaining lines"
                    );
                }
            }
        }

        summary
    }

    /// Queue a null-ticker placeholder for a transaction whose ticker is not
    /// yet known.  The full round-up amount rides on the single placeholder.
    pub async fn queue_placeholder(&self, tx: &Transaction) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        self.store
            .insert_queued_order(QueuedOrder {
                id,
                transaction_id: tx.id,
                ticker: None,
                amount: tx.round_up,
                status: OrderStatus::Queued,
                created_at: Utc::now(),
            })
            .await?;
        Ok(id)
    }

    /// Back-fill placeholder orders once resolution succeeds: set their
    /// ticker and fold their amounts into holdings.  Verifies ownership
    /// before any mutation.  Returns the number of orders back-filled.
    pub async fn backfill_placeholders(
        &self,
        owner_id: Uuid,
        tx_id: Uuid,
        ticker: &str,
    ) -> Result<usize, StoreError> {
        let tx = self.store.transaction(tx_id).await?;
        if tx.owner_id != owner_id {
            return Err(StoreError::OwnerMismatch {
                kind: "transaction",
                id: tx_id.to_string(),
            });
        }

        let mut filled = 0usize;
        let mut folded = Cents::ZERO;
        for order in self.store.orders_for_transaction(tx_id).await? {
            if order.ticker.is_some() {
                continue;
            }
            self.store.fill_order_ticker(order.id, ticker).await?;
            self.store
                .add_to_holding(owner_id, ticker, order.amount)
                .await?;
            filled += 1;
            folded += order.amount;
        }
        if filled > 0 {
            tracing::info!(
                tx_id = %tx_id,
                ticker,
                orders = filled,
                amount = %folded,
                "back-filled placeholder orders"
            );
        }
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rup_schemas::{TxSource, TxStatus};
    use rup_store::MemStore;

    fn tx(owner: Uuid) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            owner_id: owner,
            date: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
            merchant: "Target".to_string(),
            amount: Cents::new(435),
            category: None,
            description: None,
            round_up: Cents::new(65),
            fee: Cents::new(2),
            ticker: None,
            status: TxStatus::Pending,
            fingerprint: "2024-03-14|target|4.35".to_string(),
            source: TxSource::Bank,
            created_at: Utc::now(),
        }
    }

    fn allocation(ticker: &str, amount: i64) -> Allocation {
        Allocation {
            ticker: ticker.to_string(),
            percentage: 100.0,
            amount: Cents::new(amount),
        }
    }

    #[tokio::test]
    async fn ledger_writes_once_per_transaction() {
        let store = MemStore::new();
        let manager = LedgerQueueManager::new(&store);
        let tx = tx(Uuid::new_v4());

        assert!(manager.record_ledger(&tx).await.unwrap());
        assert!(!manager.record_ledger(&tx).await.unwrap());

        let entry = store
            .ledger_entry_for_transaction(tx.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.round_up, Cents::new(65));
        assert_eq!(entry.status, LedgerStatus::Pending);
    }

    #[tokio::test]
    async fn failed_order_write_does_not_block_siblings_or_ledger() {
        let store = MemStore::new();
        let owner = Uuid::new_v4();
        let tx = tx(owner);
        let manager = LedgerQueueManager::new(&store);

        manager.record_ledger(&tx).await.unwrap();
        store.inject_order_insert_faults(1);
        let summary = manager
            .queue_allocations(&tx, &[allocation("TGT", 44), allocation("NKE", 21)])
            .await;

        assert_eq!(summary, QueueWriteSummary { queued: 1, failed: 1 });
        // Ledger entry survives; the second allocation line was written.
        assert!(store
            .ledger_entry_for_transaction(tx.id)
            .await
            .unwrap()
            .is_some());
        let orders = store.orders_for_transaction(tx.id).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].ticker.as_deref(), Some("NKE"));
        // Only the successful line reached holdings.
        let holdings = store.holdings_for_owner(owner).await.unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].ticker, "NKE");
    }

    #[tokio::test]
    async fn placeholder_backfill_sets_ticker_and_folds_holdings() {
        let store = MemStore::new();
        let owner = Uuid::new_v4();
        let t = tx(owner);
        store.insert_transaction(t.clone()).await.unwrap();
        let manager = LedgerQueueManager::new(&store);

        manager.queue_placeholder(&t).await.unwrap();
        assert!(store.holdings_for_owner(owner).await.unwrap().is_empty());

        let filled = manager
            .backfill_placeholders(owner, t.id, "TGT")
            .await
            .unwrap();
        assert_eq!(filled, 1);

        let orders = store.orders_for_transaction(t.id).await.unwrap();
        assert_eq!(orders[0].ticker.as_deref(), Some("TGT"));
        let holdings = store.holdings_for_owner(owner).await.unwrap();
        assert_eq!(holdings[0].total_value, Cents::new(65));
    }

    #[tokio::test]
    async fn backfill_rejects_foreign_owner() {
        let store = MemStore::new();
        let owner = Uuid::new_v4();
        let t = tx(owner);
        store.insert_transaction(t.clone()).await.unwrap();
        let manager = LedgerQueueManager::new(&store);
        manager.queue_placeholder(&t).await.unwrap();

        let err = manager
            .backfill_placeholders(Uuid::new_v4(), t.id, "TGT")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OwnerMismatch { .. }));
        // No mutation happened.
        let orders = store.orders_for_transaction(t.id).await.unwrap();
        assert!(orders[0].ticker.is_none());
    }
}
