//! Canonical purchase row and dedup fingerprints.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use rup_schemas::{Cents, TxSource};

/// The normalization target every source converges on before the pipeline
/// touches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRow {
    /// Merchant name as it arrived; trimmed but otherwise untouched.
    pub merchant: String,
    pub date: NaiveDate,
    /// Strictly positive purchase amount.
    pub amount: Cents,
    pub category: Option<String>,
    pub description: Option<String>,
    pub source: TxSource,
}

impl PurchaseRow {
    pub fn fingerprint(&self) -> String {
        fingerprint(self.date, &self.merchant, self.amount)
    }
}

/// Natural dedup key: `date|lowercase(merchant)|amount`.
pub fn fingerprint(date: NaiveDate, merchant: &str, amount: Cents) -> String {
    format!(
        "{}|{}|{}",
        date.format("%Y-%m-%d"),
        merchant.trim().to_lowercase(),
        amount
    )
}

/// Fingerprints for one owner's batch: persisted keys loaded once up front,
/// then grown in memory as rows are accepted.  Re-querying storage per row
/// is deliberately avoided.
#[derive(Debug, Default)]
pub struct FingerprintSet {
    seen: HashSet<String>,
}

impl FingerprintSet {
    pub fn new(persisted: impl IntoIterator<Item = String>) -> Self {
        Self {
            seen: persisted.into_iter().collect(),
        }
    }

    /// Record a fingerprint.  Returns `false` when it was already present —
    /// either persisted before the batch or accepted earlier in it.
    pub fn insert(&mut self, fp: String) -> bool {
        self.seen.insert(fp)
    }

    pub fn contains(&self, fp: &str) -> bool {
        self.seen.contains(fp)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
