//! Read-only portfolio view.
//!
//! The write side of the aggregator is a single store operation
//! (`add_to_holding`); this module is the fold the CLI and batch summaries
//! read from.  Shares and average price are pass-through — they belong to
//! the execution collaborator.

use std::collections::BTreeMap;

use serde::Serialize;

use rup_schemas::{Cents, Holding};

/// A point-in-time view over one owner's holdings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PortfolioSnapshot {
    /// Ticker → accumulated round-up value.
    pub positions: BTreeMap<String, Cents>,
    /// Sum across all positions.
    pub total_value: Cents,
}

impl PortfolioSnapshot {
    pub fn from_holdings(holdings: &[Holding]) -> Self {
        let mut snapshot = PortfolioSnapshot::default();
        for h in holdings {
            *snapshot
                .positions
                .entry(h.ticker.clone())
                .or_insert(Cents::ZERO) += h.total_value;
            snapshot.total_value += h.total_value;
        }
        snapshot
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
