//! rup-store
//!
//! Datastore boundary for the round-up pipeline.
//!
//! [`Store`] is the async trait every pipeline write goes through; one method
//! per row-type operation, owner-scoped where the row has an owner.  The
//! workspace ships [`MemStore`], an in-process implementation used by the
//! CLI (with JSON snapshot persistence) and by tests.
//!
//! Every method is an async suspension point for callers; no caller may hold
//! a lock across a `Store` await.

pub mod mem;

pub use mem::MemStore;

use std::fmt;

use async_trait::async_trait;
use uuid::Uuid;

use rup_schemas::{
    Cents, Holding, LedgerEntry, MappingStatus, MerchantMapping, QueuedOrder, ReceiptAllocation,
    Transaction, TxStatus,
};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors a [`Store`] implementation may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The addressed row does not exist.
    NotFound { kind: &'static str, id: String },
    /// The addressed row exists but belongs to a different owner.  Callers
    /// must reject the operation before any mutation.
    OwnerMismatch { kind: &'static str, id: String },
    /// An insert collided with an existing row in a way the caller must not
    /// silently absorb (e.g. duplicate primary id).
    Conflict { message: String },
    /// The backing store failed (I/O, serialization, injected fault).
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            StoreError::OwnerMismatch { kind, id } => {
                write!(f, "{kind} {id} is not owned by the caller")
            }
            StoreError::Conflict { message } => write!(f, "store conflict: {message}"),
            StoreError::Backend(msg) => write!(f, "store backend error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Persistence surface for every pipeline artifact.
///
/// # Dedup race (known limitation)
///
/// `insert_transaction` does not enforce fingerprint uniqueness; dedup
/// correctness relies on the caller's read-before-write check inside one
/// logical batch (`fingerprints_for_owner` loaded once, then tracked in
/// memory).  Two concurrent ingestion runs for the same owner could insert
/// the same fingerprint twice.  Independent owners never contend.
#[async_trait]
pub trait Store: Send + Sync {
    // --- transactions ---

    async fn insert_transaction(&self, tx: Transaction) -> Result<(), StoreError>;

    async fn transaction(&self, id: Uuid) -> Result<Transaction, StoreError>;

    async fn transactions_for_owner(&self, owner_id: Uuid) -> Result<Vec<Transaction>, StoreError>;

    /// All dedup fingerprints already persisted for one owner.  Loaded once
    /// per batch, before any row is processed.
    async fn fingerprints_for_owner(&self, owner_id: Uuid) -> Result<Vec<String>, StoreError>;

    /// Transactions still awaiting a successful resolution (`pending` or
    /// `failed`), oldest first.
    async fn unresolved_transactions_for_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Tag a transaction with its resolution result.  Verifies ownership
    /// before mutating; a mismatch fails this single operation only.
    async fn set_transaction_resolution(
        &self,
        owner_id: Uuid,
        tx_id: Uuid,
        ticker: Option<String>,
        status: TxStatus,
    ) -> Result<(), StoreError>;

    // --- merchant mappings (knowledge base) ---

    /// Append a new mapping row.  Existing rows for the same merchant are
    /// never mutated — confidence history is preserved.
    async fn insert_mapping(&self, mapping: MerchantMapping) -> Result<(), StoreError>;

    /// The current best approved mapping for a merchant name:
    /// case-insensitive exact match, highest confidence wins.
    async fn best_approved_mapping(
        &self,
        merchant: &str,
    ) -> Result<Option<MerchantMapping>, StoreError>;

    /// All mappings awaiting human review, oldest first.  Consumed by the
    /// external approval surface.
    async fn pending_mappings(&self) -> Result<Vec<MerchantMapping>, StoreError>;

    /// Approve or reject a pending mapping.  This is the only status
    /// mutation the knowledge base permits.
    async fn set_mapping_status(
        &self,
        mapping_id: Uuid,
        status: MappingStatus,
    ) -> Result<(), StoreError>;

    // --- ledger ---

    /// Insert a ledger entry unless one already exists for the same
    /// transaction.  Returns `true` when a row was written, `false` when the
    /// insert was an idempotent no-op.
    async fn insert_ledger_entry(&self, entry: LedgerEntry) -> Result<bool, StoreError>;

    async fn ledger_entry_for_transaction(
        &self,
        tx_id: Uuid,
    ) -> Result<Option<LedgerEntry>, StoreError>;

    // --- order queue ---

    async fn insert_queued_order(&self, order: QueuedOrder) -> Result<(), StoreError>;

    async fn orders_for_transaction(&self, tx_id: Uuid) -> Result<Vec<QueuedOrder>, StoreError>;

    /// Back-fill the ticker of a placeholder order once resolution succeeds.
    async fn fill_order_ticker(&self, order_id: Uuid, ticker: &str) -> Result<(), StoreError>;

    // --- holdings ---

    /// Accumulate `amount` into the owner's holding for `ticker`, creating
    /// the holding with zero shares if absent.  Returns the updated row.
    /// Never touches `shares` or `average_price`.
    async fn add_to_holding(
        &self,
        owner_id: Uuid,
        ticker: &str,
        amount: Cents,
    ) -> Result<Holding, StoreError>;

    async fn holdings_for_owner(&self, owner_id: Uuid) -> Result<Vec<Holding>, StoreError>;

    // --- receipt allocations ---

    async fn insert_receipt_allocation(
        &self,
        allocation: ReceiptAllocation,
    ) -> Result<(), StoreError>;

    async fn receipt_allocations_for_transaction(
        &self,
        tx_id: Uuid,
    ) -> Result<Vec<ReceiptAllocation>, StoreError>;
}
