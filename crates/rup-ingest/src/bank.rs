//! Bank-feed normalization.
//!
//! The aggregator feed is untrusted: possibly duplicated, possibly
//! malformed, and signed from the bank's point of view (positive = debit,
//! money leaving the account).  Only debit-direction items become purchase
//! rows; credits and refunds are discarded.  Malformed items are skipped and
//! counted, never fatal — dedup downstream handles the duplicates.

use serde::{Deserialize, Serialize};

use rup_schemas::{Cents, TxSource};

use crate::bulk::parse_row_date;
use crate::row::PurchaseRow;

/// One item as returned by the bank-data aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankFeedItem {
    /// Signed amount in currency units; positive means debit.
    pub amount: f64,
    /// Date string as supplied by the aggregator (ISO or US format).
    pub date: String,
    pub description: String,
    /// Counterparty/merchant name when the aggregator could extract one.
    pub merchant_name: Option<String>,
    pub category: Option<String>,
}

/// Result of normalizing one feed pull.
#[derive(Debug, Clone, Default)]
pub struct NormalizedFeed {
    /// `(feed index, row)` — the index is the item's 0-based position in the
    /// original pull, so batch summaries can cite it after skips.
    pub rows: Vec<(usize, PurchaseRow)>,
    /// Credits, refunds, zero amounts, and malformed items.
    pub skipped: usize,
}

/// Convert aggregator items into canonical purchase rows, in feed order.
pub fn normalize_bank_feed(items: &[BankFeedItem]) -> NormalizedFeed {
    let mut out = NormalizedFeed::default();

    for (index, item) in items.iter().enumerate() {
        // Credit/refund or non-finite amount: not ingestable.
        if !item.amount.is_finite() || item.amount <= 0.0 {
            out.skipped += 1;
            continue;
        }

        let date = match parse_row_date(&item.date) {
            Some(d) => d,
            None => {
                out.skipped += 1;
                continue;
            }
        };

        let merchant = item
            .merchant_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| item.description.trim());
        if merchant.is_empty() {
            out.skipped += 1;
            continue;
        }

        out.rows.push((
            index,
            PurchaseRow {
                merchant: merchant.to_string(),
                date,
                amount: Cents::from_f64_round(item.amount),
                category: item.category.clone(),
                description: Some(item.description.clone()),
                source: TxSource::Bank,
            },
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(amount: f64, merchant: Option<&str>) -> BankFeedItem {
        BankFeedItem {
            amount,
            date: "2024-03-14".to_string(),
            description: "CARD PURCHASE 1912".to_string(),
            merchant_name: merchant.map(str::to_string),
            category: Some("Food and Drink".to_string()),
        }
    }

    #[test]
    fn credits_and_refunds_are_discarded() {
        let feed = normalize_bank_feed(&[
            item(4.35, Some("Starbucks")),
            item(-12.00, Some("Refund Co")),
            item(0.0, Some("Zero Co")),
        ]);
        assert_eq!(feed.rows.len(), 1);
        assert_eq!(feed.skipped, 2);
        assert_eq!(feed.rows[0].1.merchant, "Starbucks");
        assert_eq!(feed.rows[0].1.amount, Cents::new(435));
    }

    #[test]
    fn rows_keep_their_feed_position_across_skips() {
        let feed = normalize_bank_feed(&[
            item(-3.00, Some("Refund Co")),
            item(4.35, Some("Starbucks")),
            item(0.0, Some("Zero Co")),
            item(7.25, Some("Ed's Bait Shop")),
        ]);
        let positions: Vec<usize> = feed.rows.iter().map(|(i, _)| *i).collect();
        assert_eq!(positions, vec![1, 3]);
    }

    #[test]
    fn falls_back_to_description_when_merchant_missing() {
        let feed = normalize_bank_feed(&[item(7.00, None)]);
        assert_eq!(feed.rows[0].1.merchant, "CARD PURCHASE 1912");
    }

    #[test]
    fn malformed_date_skips_the_item() {
        let mut bad = item(5.00, Some("X"));
        bad.date = "last tuesday".to_string();
        let feed = normalize_bank_feed(&[bad]);
        assert!(feed.rows.is_empty());
        assert_eq!(feed.skipped, 1);
    }

    #[test]
    fn float_noise_rounds_to_cents() {
        // 4.9999999 must land on 5.00, not 4.99 — and then count as a whole
        // amount downstream.
        let feed = normalize_bank_feed(&[item(4.999_999_9, Some("X"))]);
        assert_eq!(feed.rows[0].1.amount, Cents::new(500));
        assert!(feed.rows[0].1.amount.is_whole_units());
    }
}
