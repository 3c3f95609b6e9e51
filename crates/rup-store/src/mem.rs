//! In-process [`Store`] implementation.
//!
//! Tables live behind one `std::sync::Mutex` — every method locks, mutates,
//! and releases before returning, so no lock is ever held across an await.
//! The whole table set serializes to JSON, which is how the CLI persists
//! state between invocations.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rup_schemas::{
    Cents, Holding, LedgerEntry, MappingStatus, MerchantMapping, QueuedOrder, ReceiptAllocation,
    Transaction, TxStatus,
};

use crate::{Store, StoreError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    transactions: Vec<Transaction>,
    mappings: Vec<MerchantMapping>,
    ledger: Vec<LedgerEntry>,
    orders: Vec<QueuedOrder>,
    holdings: Vec<Holding>,
    receipt_allocations: Vec<ReceiptAllocation>,
}

/// In-memory store with optional JSON snapshot persistence.
#[derive(Debug, Default)]
pub struct MemStore {
    tables: Mutex<Tables>,
    /// Fault-injection hooks: the next N calls of the matching insert fail
    /// with a backend error.  Used by scenario tests to exercise
    /// partial-failure semantics; stay zero in production use.
    order_insert_faults: Mutex<usize>,
    transaction_insert_faults: Mutex<usize>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a previously saved snapshot.
    pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| StoreError::Backend(format!("read snapshot: {e}")))?;
        let tables: Tables = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Backend(format!("decode snapshot: {e}")))?;
        Ok(Self {
            tables: Mutex::new(tables),
            ..Self::default()
        })
    }

    /// Write the current tables as a JSON snapshot.
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let json = {
            let tables = self.lock();
            serde_json::to_string_pretty(&*tables)
                .map_err(|e| StoreError::Backend(format!("encode snapshot: {e}")))?
        };
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Backend(format!("create snapshot dir: {e}")))?;
        }
        std::fs::write(path.as_ref(), json)
            .map_err(|e| StoreError::Backend(format!("write snapshot: {e}")))
    }

    /// Make the next `n` queued-order inserts fail (fault injection).
    pub fn inject_order_insert_faults(&self, n: usize) {
        *lock_recover(&self.order_insert_faults) = n;
    }

    /// Make the next `n` transaction inserts fail (fault injection).
    pub fn inject_transaction_insert_faults(&self, n: usize) {
        *lock_recover(&self.transaction_insert_faults) = n;
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        lock_recover(&self.tables)
    }
}

// A poisoned mutex here only means a panic mid-mutation in another test
// thread; the tables are still structurally valid JSON-serializable state.
fn lock_recover<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl Store for MemStore {
    async fn insert_transaction(&self, tx: Transaction) -> Result<(), StoreError> {
        {
            let mut faults = lock_recover(&self.transaction_insert_faults);
            if *faults > 0 {
                *faults -= 1;
                return Err(StoreError::Backend("injected transaction-insert fault".into()));
            }
        }
        let mut t = self.lock();
        if t.transactions.iter().any(|existing| existing.id == tx.id) {
            return Err(StoreError::Conflict {
                message: format!("transaction id {} already exists", tx.id),
            });
        }
        t.transactions.push(tx);
        Ok(())
    }

    async fn transaction(&self, id: Uuid) -> Result<Transaction, StoreError> {
        self.lock()
            .transactions
            .iter()
            .find(|tx| tx.id == id)
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: "transaction",
                id: id.to_string(),
            })
    }

    async fn transactions_for_owner(&self, owner_id: Uuid) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .lock()
            .transactions
            .iter()
            .filter(|tx| tx.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn fingerprints_for_owner(&self, owner_id: Uuid) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lock()
            .transactions
            .iter()
            .filter(|tx| tx.owner_id == owner_id)
            .map(|tx| tx.fingerprint.clone())
            .collect())
    }

    async fn unresolved_transactions_for_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut rows: Vec<Transaction> = self
            .lock()
            .transactions
            .iter()
            .filter(|tx| tx.owner_id == owner_id && tx.status != TxStatus::Mapped)
            .cloned()
            .collect();
        rows.sort_by_key(|tx| tx.created_at);
        Ok(rows)
    }

    async fn set_transaction_resolution(
        &self,
        owner_id: Uuid,
        tx_id: Uuid,
        ticker: Option<String>,
        status: TxStatus,
    ) -> Result<(), StoreError> {
        let mut t = self.lock();
        let tx = t
            .transactions
            .iter_mut()
            .find(|tx| tx.id == tx_id)
            .ok_or(StoreError::NotFound {
                kind: "transaction",
                id: tx_id.to_string(),
            })?;
        if tx.owner_id != owner_id {
            return Err(StoreError::OwnerMismatch {
                kind: "transaction",
                id: tx_id.to_string(),
            });
        }
        tx.ticker = ticker;
        tx.status = status;
        Ok(())
    }

    async fn insert_mapping(&self, mapping: MerchantMapping) -> Result<(), StoreError> {
        self.lock().mappings.push(mapping);
        Ok(())
    }

    async fn best_approved_mapping(
        &self,
        merchant: &str,
    ) -> Result<Option<MerchantMapping>, StoreError> {
        let needle = merchant.trim().to_lowercase();
        Ok(self
            .lock()
            .mappings
            .iter()
            .filter(|m| m.status == MappingStatus::Approved && m.merchant.to_lowercase() == needle)
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned())
    }

    async fn pending_mappings(&self) -> Result<Vec<MerchantMapping>, StoreError> {
        let mut rows: Vec<MerchantMapping> = self
            .lock()
            .mappings
            .iter()
            .filter(|m| m.status == MappingStatus::Pending)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.created_at);
        Ok(rows)
    }

    async fn set_mapping_status(
        &self,
        mapping_id: Uuid,
        status: MappingStatus,
    ) -> Result<(), StoreError> {
        let mut t = self.lock();
        let m = t
            .mappings
            .iter_mut()
            .find(|m| m.id == mapping_id)
            .ok_or(StoreError::NotFound {
                kind: "mapping",
                id: mapping_id.to_string(),
            })?;
        m.status = status;
        Ok(())
    }

    async fn insert_ledger_entry(&self, entry: LedgerEntry) -> Result<bool, StoreError> {
        let mut t = self.lock();
        if t.ledger
            .iter()
            .any(|e| e.transaction_id == entry.transaction_id)
        {
            return Ok(false);
        }
        t.ledger.push(entry);
        Ok(true)
    }

    async fn ledger_entry_for_transaction(
        &self,
        tx_id: Uuid,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        Ok(self
            .lock()
            .ledger
            .iter()
            .find(|e| e.transaction_id == tx_id)
            .cloned())
    }

    async fn insert_queued_order(&self, order: QueuedOrder) -> Result<(), StoreError> {
        {
            let mut faults = lock_recover(&self.order_insert_faults);
            if *faults > 0 {
                *faults -= 1;
                return Err(StoreError::Backend("injected order-insert fault".into()));
            }
        }
        self.lock().orders.push(order);
        Ok(())
    }

    async fn orders_for_transaction(&self, tx_id: Uuid) -> Result<Vec<QueuedOrder>, StoreError> {
        Ok(self
            .lock()
            .orders
            .iter()
            .filter(|o| o.transaction_id == tx_id)
            .cloned()
            .collect())
    }

    async fn fill_order_ticker(&self, order_id: Uuid, ticker: &str) -> Result<(), StoreError> {
        let mut t = self.lock();
        let order = t
            .orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or(StoreError::NotFound {
                kind: "order",
                id: order_id.to_string(),
            })?;
        order.ticker = Some(ticker.to_string());
        Ok(())
    }

    async fn add_to_holding(
        &self,
        owner_id: Uuid,
        ticker: &str,
        amount: Cents,
    ) -> Result<Holding, StoreError> {
        let mut t = self.lock();
        if let Some(h) = t
            .holdings
            .iter_mut()
            .find(|h| h.owner_id == owner_id && h.ticker == ticker)
        {
            h.total_value += amount;
            h.updated_at = Utc::now();
            return Ok(h.clone());
        }
        let holding = Holding {
            id: Uuid::new_v4(),
            owner_id,
            ticker: ticker.to_string(),
            shares: 0.0,
            average_price: Cents::ZERO,
            current_price: Cents::ZERO,
            total_value: amount,
            updated_at: Utc::now(),
        };
        t.holdings.push(holding.clone());
        Ok(holding)
    }

    async fn holdings_for_owner(&self, owner_id: Uuid) -> Result<Vec<Holding>, StoreError> {
        let mut rows: Vec<Holding> = self
            .lock()
            .holdings
            .iter()
            .filter(|h| h.owner_id == owner_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        Ok(rows)
    }

    async fn insert_receipt_allocation(
        &self,
        allocation: ReceiptAllocation,
    ) -> Result<(), StoreError> {
        self.lock().receipt_allocations.push(allocation);
        Ok(())
    }

    async fn receipt_allocations_for_transaction(
        &self,
        tx_id: Uuid,
    ) -> Result<Vec<ReceiptAllocation>, StoreError> {
        Ok(self
            .lock()
            .receipt_allocations
            .iter()
            .filter(|a| a.transaction_id == tx_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rup_schemas::{LedgerStatus, MappingProvenance, TxSource};

    fn tx(owner: Uuid, merchant: &str, cents: i64) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            owner_id: owner,
            date: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
            merchant: merchant.to_string(),
            amount: Cents::new(cents),
            category: None,
            description: None,
            round_up: Cents::new(100 - cents % 100),
            fee: Cents::new(2),
            ticker: None,
            status: TxStatus::Pending,
            fingerprint: format!("2024-03-14|{}|{}", merchant.to_lowercase(), cents),
            source: TxSource::Bulk,
            created_at: Utc::now(),
        }
    }

    fn mapping(merchant: &str, ticker: &str, confidence: f64, status: MappingStatus) -> MerchantMapping {
        MerchantMapping {
            id: Uuid::new_v4(),
            merchant: merchant.to_string(),
            ticker: ticker.to_string(),
            company: ticker.to_string(),
            category: None,
            confidence,
            status,
            ai_processed: false,
            provenance: MappingProvenance::Manual,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn best_approved_mapping_prefers_highest_confidence() {
        let store = MemStore::new();
        store
            .insert_mapping(mapping("Starbucks", "SBUX", 0.80, MappingStatus::Approved))
            .await
            .unwrap();
        store
            .insert_mapping(mapping("starbucks", "SBUX", 0.95, MappingStatus::Approved))
            .await
            .unwrap();
        store
            .insert_mapping(mapping("Starbucks", "XXXX", 0.99, MappingStatus::Pending))
            .await
            .unwrap();

        let best = store
            .best_approved_mapping("  STARBUCKS ")
            .await
            .unwrap()
            .expect("approved mapping");
        assert_eq!(best.ticker, "SBUX");
        assert_eq!(best.confidence, 0.95);
    }

    #[tokio::test]
    async fn ledger_insert_is_idempotent_per_transaction() {
        let store = MemStore::new();
        let tx_id = Uuid::new_v4();
        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            transaction_id: tx_id,
            round_up: Cents::new(65),
            fee: Cents::new(2),
            status: LedgerStatus::Pending,
            created_at: Utc::now(),
        };
        assert!(store.insert_ledger_entry(entry.clone()).await.unwrap());
        let again = LedgerEntry {
            id: Uuid::new_v4(),
            ..entry
        };
        assert!(!store.insert_ledger_entry(again).await.unwrap());
        assert!(store
            .ledger_entry_for_transaction(tx_id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn resolution_rejects_foreign_owner() {
        let store = MemStore::new();
        let owner = Uuid::new_v4();
        let intruder = Uuid::new_v4();
        let t = tx(owner, "Target", 435);
        let tx_id = t.id;
        store.insert_transaction(t).await.unwrap();

        let err = store
            .set_transaction_resolution(intruder, tx_id, Some("TGT".into()), TxStatus::Mapped)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OwnerMismatch { .. }));

        // Row untouched.
        let row = store.transaction(tx_id).await.unwrap();
        assert_eq!(row.status, TxStatus::Pending);
        assert!(row.ticker.is_none());
    }

    #[tokio::test]
    async fn holdings_accumulate_without_touching_shares() {
        let store = MemStore::new();
        let owner = Uuid::new_v4();
        store.add_to_holding(owner, "AAPL", Cents::new(65)).await.unwrap();
        let h = store.add_to_holding(owner, "AAPL", Cents::new(35)).await.unwrap();
        assert_eq!(h.total_value, Cents::new(100));
        assert_eq!(h.shares, 0.0);
        assert_eq!(h.average_price, Cents::ZERO);
        assert_eq!(store.holdings_for_owner(owner).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn snapshot_round_trips() {
        let store = MemStore::new();
        let owner = Uuid::new_v4();
        store.insert_transaction(tx(owner, "Costco", 1201)).await.unwrap();
        store.add_to_holding(owner, "COST", Cents::new(99)).await.unwrap();

        let path = std::env::temp_dir().join(format!(
            "rup_store_snapshot_{}_{}.json",
            std::process::id(),
            Uuid::new_v4().as_simple()
        ));
        store.save_snapshot(&path).unwrap();

        let restored = MemStore::load_snapshot(&path).unwrap();
        assert_eq!(
            restored.transactions_for_owner(owner).await.unwrap().len(),
            1
        );
        assert_eq!(restored.holdings_for_owner(owner).await.unwrap().len(), 1);
        let _ = std::fs::remove_file(&path);
    }
}
