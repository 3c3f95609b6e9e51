//! rup-schemas
//!
//! Shared row and wire types for the round-up pipeline.  Every crate in the
//! workspace speaks these types; no business logic lives here beyond trivial
//! constructors and status parsing.

pub mod cents;

pub use cents::{Cents, ParseCentsError};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// Where a purchase event entered the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxSource {
    Bank,
    Bulk,
    Receipt,
}

impl TxSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxSource::Bank => "bank",
            TxSource::Bulk => "bulk",
            TxSource::Receipt => "receipt",
        }
    }
}

/// Lifecycle status of a transaction.
///
/// `Failed` is not terminal: a later manual or re-run resolution attempt may
/// still move it to `Mapped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Mapped,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Mapped => "mapped",
            TxStatus::Failed => "failed",
        }
    }
}

/// One purchase event.
///
/// `fingerprint` is the natural dedup key (`date|lowercase(merchant)|amount`)
/// computed at ingestion time and never recomputed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub date: NaiveDate,
    /// Merchant name exactly as it arrived from the source.
    pub merchant: String,
    /// Purchase amount; strictly positive.
    pub amount: Cents,
    pub category: Option<String>,
    pub description: Option<String>,
    /// Always > 0 once computed at ingestion.
    pub round_up: Cents,
    /// Platform fee; never exceeds `round_up`.
    pub fee: Cents,
    /// Resolved ticker symbol; `None` until resolution succeeds.
    pub ticker: Option<String>,
    pub status: TxStatus,
    pub fingerprint: String,
    pub source: TxSource,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// MerchantMapping
// ---------------------------------------------------------------------------

/// Review status of a learned merchant → ticker fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingStatus {
    Pending,
    Approved,
    Rejected,
}

/// Who or what created a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingProvenance {
    /// Entered by a human through the (external) review surface.
    Manual,
    /// Produced by the language-model inference endpoint.
    Inference,
    /// Matched against the static brand/ticker fallback table.
    FuzzyTable,
    /// Supplied inline by a bulk import row.
    BulkImport,
}

/// A learned fact: merchant name → ticker, with confidence and provenance.
///
/// Many rows may exist per merchant name; readers always prefer the
/// highest-confidence **approved** row.  Rows are append-only from the
/// pipeline's point of view — only the external approval action flips
/// `status`, and nothing mutates `confidence` in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantMapping {
    pub id: Uuid,
    pub merchant: String,
    pub ticker: String,
    pub company: String,
    pub category: Option<String>,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub status: MappingStatus,
    /// `true` when this row was produced by an inference call.
    pub ai_processed: bool,
    pub provenance: MappingProvenance,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Ledger & queue
// ---------------------------------------------------------------------------

/// Settlement status of a ledger entry.  The pipeline only ever produces
/// `Pending`; `Swept` is written by the downstream settlement collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Pending,
    Swept,
}

/// One round-up's financial record, 1:1 with a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub round_up: Cents,
    pub fee: Cents,
    pub status: LedgerStatus,
    pub created_at: DateTime<Utc>,
}

/// Execution status of a queued order.  The pipeline only ever produces
/// `Queued`; execution belongs to the out-of-scope brokerage collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Queued,
    Executed,
}

/// An investable intent: one allocation line of one round-up.
///
/// `ticker` is `None` for a placeholder awaiting resolution; it is
/// back-filled when resolution later succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedOrder {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub ticker: Option<String>,
    pub amount: Cents,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Holding
// ---------------------------------------------------------------------------

/// Aggregate position per owner and ticker.
///
/// The pipeline only accumulates `total_value`.  `shares`, `average_price`
/// and `current_price` belong to the execution/settlement and pricing
/// collaborators and are never touched here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub ticker: String,
    pub shares: f64,
    pub average_price: Cents,
    pub current_price: Cents,
    pub total_value: Cents,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Receipt
// ---------------------------------------------------------------------------

/// One line item of an OCR'd receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub name: String,
    pub brand: Option<String>,
    pub amount: Cents,
}

/// An already-OCR'd receipt payload, as submitted by the capture surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptPayload {
    pub retailer: String,
    pub items: Vec<ReceiptItem>,
    pub total: Cents,
}

/// One resolved allocation line of a receipt, persisted for audit alongside
/// its corresponding [`QueuedOrder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptAllocation {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub ticker: String,
    pub amount: Cents,
    /// Share of the round-up, in percent.
    pub percentage: f64,
    pub confidence: f64,
    /// Human-readable provenance, e.g. `retailer: Target` or `brand: Nike`.
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
