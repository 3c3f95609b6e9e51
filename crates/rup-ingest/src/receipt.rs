//! Receipt capture normalization.
//!
//! A receipt arrives already OCR'd: retailer, line items, total.  This
//! module validates the payload, produces the canonical purchase row for the
//! whole receipt, and computes the weighted candidate *names* the resolver
//! will later map to tickers — retailer at base weight 1.0, each branded
//! line item weighted by its share of the receipt total.

use std::fmt;

use chrono::NaiveDate;

use rup_schemas::{Cents, ReceiptPayload, TxSource};

use crate::row::PurchaseRow;

/// Validation failures for a receipt payload.  Structural — the submission
/// is rejected before any row is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptError {
    EmptyRetailer,
    NonPositiveTotal { total: Cents },
}

impl fmt::Display for ReceiptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiptError::EmptyRetailer => write!(f, "receipt retailer is empty"),
            ReceiptError::NonPositiveTotal { total } => {
                write!(f, "receipt total must be positive, got {total}")
            }
        }
    }
}

impl std::error::Error for ReceiptError {}

/// A candidate merchant/brand name with its allocation weight, prior to
/// ticker resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedWeight {
    pub name: String,
    pub weight: f64,
    /// `true` for the retailer line, `false` for a brand line item.
    pub is_retailer: bool,
}

/// The canonical purchase row for a receipt submission, dated to the
/// capture day supplied by the caller.
pub fn receipt_purchase_row(
    payload: &ReceiptPayload,
    date: NaiveDate,
) -> Result<PurchaseRow, ReceiptError> {
    let retailer = payload.retailer.trim();
    if retailer.is_empty() {
        return Err(ReceiptError::EmptyRetailer);
    }
    if payload.total <= Cents::ZERO {
        return Err(ReceiptError::NonPositiveTotal {
            total: payload.total,
        });
    }
    Ok(PurchaseRow {
        merchant: retailer.to_string(),
        date,
        amount: payload.total,
        category: None,
        description: Some(format!("receipt: {} items", payload.items.len())),
        source: TxSource::Receipt,
    })
}

/// Weighted candidate names for allocation: the retailer plus every branded
/// line item with a positive amount.  Duplicate brand names keep separate
/// entries here — the allocation engine merges by resolved symbol, which is
/// the identity that actually matters.
pub fn receipt_candidates(payload: &ReceiptPayload) -> Vec<NamedWeight> {
    let mut out = vec![NamedWeight {
        name: payload.retailer.trim().to_string(),
        weight: 1.0,
        is_retailer: true,
    }];

    if payload.total <= Cents::ZERO {
        return out;
    }
    let total_units = payload.total.to_units_f64();

    for item in &payload.items {
        let brand = match item.brand.as_deref().map(str::trim) {
            Some(b) if !b.is_empty() => b,
            _ => continue,
        };
        if item.amount <= Cents::ZERO {
            continue;
        }
        out.push(NamedWeight {
            name: brand.to_string(),
            weight: item.amount.to_units_f64() / total_units,
            is_retailer: false,
        });
    }

    out
}
