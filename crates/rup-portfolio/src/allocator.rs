//! Allocation engine.
//!
//! Distributes a single round-up amount across one-to-many weighted ticker
//! candidates.
//!
//! # Algorithm
//!
//! 1. Validate inputs (positive round-up, non-empty tickers, finite positive
//!    weights).
//! 2. Merge duplicate symbols — weights add, first-seen order is kept.
//! 3. Cap at [`MAX_ALLOCATION_TICKERS`] distinct tickers, and never more
//!    lines than the round-up has cents: the highest-weight candidates
//!    survive, still in first-seen order.
//! 4. `percentage = weight / Σweights * 100` for every line.  Amounts are
//!    rounded to the cent **except the last line**, which takes
//!    `R − Σ(previous amounts)` so the lines sum to exactly `R` regardless
//!    of rounding.  Every amount is floored at one cent; a non-last line is
//!    additionally clamped so each later line still has a cent left to take.
//!
//! An empty candidate list yields zero allocations; the caller must keep the
//! transaction unmapped rather than dropping the round-up.

use std::fmt;

use serde::{Deserialize, Serialize};

use rup_schemas::Cents;

/// Most distinct tickers one round-up may be split across.
pub const MAX_ALLOCATION_TICKERS: usize = 5;

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum AllocationError {
    /// The round-up amount must be strictly positive.
    NonPositiveRoundUp { round_up: Cents },
    /// A candidate ticker is an empty string.
    EmptyTicker,
    /// A weight is NaN, infinite, or not strictly positive.
    InvalidWeight { ticker: String, weight: f64 },
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonPositiveRoundUp { round_up } => {
                write!(f, "round-up must be > 0, got {round_up}")
            }
            Self::EmptyTicker => write!(f, "candidate ticker must not be empty"),
            Self::InvalidWeight { ticker, weight } => {
                write!(f, "invalid weight {weight} for ticker '{ticker}'")
            }
        }
    }
}

impl std::error::Error for AllocationError {}

// ─── Types ───────────────────────────────────────────────────────────────────

/// A resolved ticker with its allocation weight.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedCandidate {
    pub ticker: String,
    pub weight: f64,
}

impl WeightedCandidate {
    pub fn new(ticker: impl Into<String>, weight: f64) -> Self {
        Self {
            ticker: ticker.into(),
            weight,
        }
    }
}

/// One ticker's share of a single round-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub ticker: String,
    /// Share of the round-up, in percent (not rounded).
    pub percentage: f64,
    /// Exact cent amount; all lines of one round-up sum to it exactly.
    pub amount: Cents,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Split `round_up` across `candidates`.
///
/// `Σ amount == round_up` exactly for every weight set: the line count is
/// bounded by the round-up's cent count, so the one-cent floor and the
/// exact sum never conflict.
pub fn allocate(
    round_up: Cents,
    candidates: &[WeightedCandidate],
) -> Result<Vec<Allocation>, AllocationError> {
    if round_up <= Cents::ZERO {
        return Err(AllocationError::NonPositiveRoundUp { round_up });
    }
    for c in candidates {
        if c.ticker.trim().is_empty() {
            return Err(AllocationError::EmptyTicker);
        }
        if !c.weight.is_finite() || c.weight <= 0.0 {
            return Err(AllocationError::InvalidWeight {
                ticker: c.ticker.clone(),
                weight: c.weight,
            });
        }
    }
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    // Merge duplicate symbols; weights add, first-seen order kept.
    let mut merged: Vec<(String, f64)> = Vec::new();
    for c in candidates {
        let symbol = c.ticker.trim().to_ascii_uppercase();
        match merged.iter_mut().find(|(s, _)| *s == symbol) {
            Some((_, w)) => *w += c.weight,
            None => merged.push((symbol, c.weight)),
        }
    }

    // Cap at MAX_ALLOCATION_TICKERS, and never more lines than there are
    // cents to hand out: keep the heaviest, in first-seen order.
    let max_lines = MAX_ALLOCATION_TICKERS.min(round_up.raw() as usize);
    retain_heaviest(&mut merged, max_lines);

    let total_weight: f64 = merged.iter().map(|(_, w)| w).sum();
    let last = merged.len() - 1;

    let mut out = Vec::with_capacity(merged.len());
    let mut allocated = Cents::ZERO;

    for (i, (ticker, weight)) in merged.into_iter().enumerate() {
        let percentage = weight / total_weight * 100.0;
        let amount = if i == last {
            // Remainder line: absorbs all rounding drift so the sum is exact.
            round_up - allocated
        } else {
            // Clamp so every later line, the remainder included, keeps >= 1.
            let rounded = (percentage / 100.0 * round_up.raw() as f64).round() as i64;
            let ceiling = (round_up - allocated).raw() - (last - i) as i64;
            Cents::new(rounded.clamp(1, ceiling))
        };
        allocated += amount;
        out.push(Allocation {
            ticker,
            percentage,
            amount,
        });
    }

    Ok(out)
}

fn retain_heaviest(merged: &mut Vec<(String, f64)>, limit: usize) {
    if merged.len() <= limit {
        return;
    }
    let mut order: Vec<usize> = (0..merged.len()).collect();
    order.sort_by(|&a, &b| {
        merged[b].1
            .partial_cmp(&merged[a].1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    let mut keep = vec![false; merged.len()];
    for &i in order.iter().take(limit) {
        keep[i] = true;
    }
    let mut i = 0;
    merged.retain(|_| {
        let k = keep[i];
        i += 1;
        k
    });
}

// ─── Tests ───────────────────────────────────────────────────────────────────
