//! Round-up and fee calculator.
//!
//! Pure and deterministic: amount in, breakdown out. The fee rate and the
//! owner's default round-up are explicit parameters fetched once per batch
//! by the caller — never looked up per row.
//!
//! Amounts with more than two decimal places are normalized to cents at the
//! ingestion boundary (`Cents` construction), so the whole-amount test here
//! cannot be fooled by floating-point noise.

use rup_schemas::Cents;

/// The monetary result of one round-up computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundUpBreakdown {
    /// Always strictly positive.
    pub round_up: Cents,
    /// Never exceeds `round_up`.
    pub fee: Cents,
    /// `round_up - fee`.
    pub net: Cents,
}

/// The delta to the next whole currency unit; whole amounts take the
/// owner's configured default instead of zero.
pub fn compute_round_up(amount: Cents, default_round_up: Cents) -> Cents {
    let rem = amount.raw().rem_euclid(100);
    if rem == 0 {
        default_round_up
    } else {
        Cents::new(100 - rem)
    }
}

/// Full breakdown: round-up, platform fee (rounded to the cent, clamped to
/// the round-up), and the net investable remainder.
pub fn breakdown(amount: Cents, default_round_up: Cents, fee_rate: f64) -> RoundUpBreakdown {
    let round_up = compute_round_up(amount, default_round_up);
    let fee = round_up.mul_rate(fee_rate).min(round_up).max(Cents::ZERO);
    RoundUpBreakdown {
        round_up,
        fee,
        net: round_up - fee,
    }
}
