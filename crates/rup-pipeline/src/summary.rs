//! Per-batch outcome reporting.

use serde::{Deserialize, Serialize};

/// One reported row failure.  `row` is the source position: the 1-based file
/// line for bulk CSV, the 0-based feed index for bank sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryError {
    pub row: usize,
    pub message: String,
}

/// What one ingestion run did, row by row.
///
/// `success` counts rows that were ingested — round-up computed, transaction
/// and ledger entry written — even when merchant resolution later fell to
/// needs-review.  `failed` counts rows rejected at parse/validation, and
/// `skipped` counts dedup hits plus non-ingestable feed items.  The error
/// list carries the first `max_reported_errors` failures only; the rest are
/// counted but not itemized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<SummaryError>,
    /// Failures beyond the reporting cap.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub unreported_errors: usize,
    /// Queued-order writes that failed after the row was ingested.  The
    /// ledger entry survives; the re-resolution sweep can re-queue.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub queue_write_failures: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl BatchSummary {
    /// Record one row failure, respecting the reporting cap.
    pub fn record_failure(&mut self, row: usize, message: impl Into<String>, cap: usize) {
        self.failed += 1;
        if self.errors.len() < cap {
            self.errors.push(SummaryError {
                row,
                message: message.into(),
            });
        } else {
            self.unreported_errors += 1;
        }
    }
}

/// What one re-resolution sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReResolveSummary {
    /// Transactions examined.
    pub examined: usize,
    /// Transactions newly tagged with a ticker.
    pub resolved: usize,
    /// Placeholder orders back-filled across the resolved transactions.
    pub backfilled_orders: usize,
    /// Transactions still unresolved after the sweep.
    pub still_unresolved: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_list_is_capped_but_counts_continue() {
        let mut s = BatchSummary::default();
        for i in 0..5 {
            s.record_failure(i, format!("row {i} bad"), 3);
        }
        assert_eq!(s.failed, 5);
        assert_eq!(s.errors.len(), 3);
        assert_eq!(s.unreported_errors, 2);
        assert_eq!(s.errors[0].row, 0);
    }
}
