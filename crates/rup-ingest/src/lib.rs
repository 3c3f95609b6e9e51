//! rup-ingest
//!
//! Ingestion & Dedup Gate.
//!
//! This crate owns the **read** side of each purchase source: it turns raw
//! input (a bulk CSV blob, a bank-feed pull, an OCR'd receipt payload) into
//! canonical [`PurchaseRow`] values plus per-row errors, and it owns the
//! fingerprint machinery the dedup gate runs on.  It does **not** write to
//! the store, compute round-ups, or resolve merchants — callers hand the
//! resulting rows to the pipeline crate.

pub mod bank;
pub mod bulk;
pub mod receipt;
pub mod row;

pub use bank::{normalize_bank_feed, BankFeedItem, NormalizedFeed};
pub use bulk::{parse_bulk_csv, BulkError, BulkRow, BulkRows, RowError};
pub use receipt::{receipt_candidates, receipt_purchase_row, NamedWeight, ReceiptError};
pub use row::{fingerprint, FingerprintSet, PurchaseRow};
