//! Fixed-point money type.
//!
//! # Motivation
//!
//! Every monetary amount in this system is a whole number of cents stored as
//! `i64` (1 USD = 100 cents).  Using raw `i64` for money is error-prone: it
//! allows accidental arithmetic with unrelated integers (weights, row
//! numbers, IDs) without any compile-time signal, and `f64` arithmetic would
//! reintroduce the exact rounding noise the round-up pipeline must avoid.
//!
//! `Cents` wraps the raw `i64` so the type system prevents:
//! - Implicit construction from raw `i64` (no `From<i64>` impl).
//! - Mixing `Cents` with unrelated `i64` values in arithmetic.
//!
//! # Scale
//!
//! The whole domain rounds at two decimal places, so cents are exact.
//! Fractional-share quantities stay `f64` — they are not money.
//!
//! # Arithmetic
//!
//! - `Add`, `Sub`, `Neg`, `AddAssign`, `SubAssign` are implemented for
//!   `Cents op Cents`; these panic on overflow in debug builds and wrap in
//!   release (matching Rust's standard integer semantics).
//! - `saturating_add` / `saturating_sub` — safe alternatives that clamp.
//! - `mul_rate(rate: f64)` — multiply by a fractional rate with
//!   half-away-from-zero rounding to the nearest cent (fee computation).

use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// A monetary amount in whole cents (1 USD = `Cents(100)`).
///
/// Serializes as the raw cent count, so persisted rows and wire payloads
/// never carry a lossy float.
///
/// # Construction
///
/// Use [`Cents::new`] for explicit construction from a raw cent count,
/// [`Cents::from_str_decimal`] for user/CSV input (`"4.35"`), or
/// [`Cents::from_f64_round`] when the value arrives as a float from an
/// external feed.  There is intentionally no `From<i64>` implementation.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cents(i64);

/// Errors from [`Cents::from_str_decimal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseCentsError {
    /// Input was empty after trimming decorations.
    Empty,
    /// Input contained a character that is not a digit, sign, or separator.
    BadChar { raw: String },
    /// Numeric value does not fit in an `i64` cent count.
    Overflow { raw: String },
}

impl fmt::Display for ParseCentsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseCentsError::Empty => write!(f, "empty amount"),
            ParseCentsError::BadChar { raw } => write!(f, "cannot parse amount '{raw}'"),
            ParseCentsError::Overflow { raw } => write!(f, "amount '{raw}' out of range"),
        }
    }
}

impl std::error::Error for ParseCentsError {}

impl Cents {
    /// Zero monetary amount.
    pub const ZERO: Cents = Cents(0);

    /// One whole currency unit ($1.00).
    pub const ONE_UNIT: Cents = Cents(100);

    /// Construct from a raw cent count.
    #[inline]
    pub const fn new(raw: i64) -> Self {
        Cents(raw)
    }

    /// Extract the underlying raw cent count.
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// `true` when the amount is an exact number of whole currency units.
    #[inline]
    pub const fn is_whole_units(self) -> bool {
        self.0 % 100 == 0
    }

    /// Parse a decimal string (`"4.35"`, `"$1,234.5"`, `"(12.00)"` for
    /// negative) into cents, rounding half-away-from-zero at the second
    /// decimal place.  Inputs with more than two decimals are normalized
    /// here, before any whole-amount test downstream.
    pub fn from_str_decimal(raw: &str) -> Result<Cents, ParseCentsError> {
        let mut s = raw.trim().replace([',', '$', '"'], "");
        let mut negate = false;
        if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
            negate = true;
            s = inner.trim().to_string();
        }
        if let Some(rest) = s.strip_prefix('-') {
            negate = !negate;
            s = rest.to_string();
        } else if let Some(rest) = s.strip_prefix('+') {
            s = rest.to_string();
        }
        if s.is_empty() {
            return Err(ParseCentsError::Empty);
        }

        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s.as_str(), ""),
        };
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
            || (int_part.is_empty() && frac_part.is_empty())
        {
            return Err(ParseCentsError::BadChar {
                raw: raw.to_string(),
            });
        }

        let units: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| ParseCentsError::Overflow {
                raw: raw.to_string(),
            })?
        };

        // First two fractional digits are cents; the third decides rounding.
        let mut digits = frac_part.chars();
        let d1 = digits.next().and_then(|c| c.to_digit(10)).unwrap_or(0) as i64;
        let d2 = digits.next().and_then(|c| c.to_digit(10)).unwrap_or(0) as i64;
        let d3 = digits.next().and_then(|c| c.to_digit(10)).unwrap_or(0) as i64;

        let mut cents = units
            .checked_mul(100)
            .and_then(|v| v.checked_add(d1 * 10 + d2))
            .ok_or_else(|| ParseCentsError::Overflow {
                raw: raw.to_string(),
            })?;
        if d3 >= 5 {
            cents += 1;
        }
        if negate {
            cents = -cents;
        }
        Ok(Cents(cents))
    }

    /// Convert a float amount in currency units to cents, rounding
    /// half-away-from-zero at the second decimal place.
    #[inline]
    pub fn from_f64_round(units: f64) -> Cents {
        Cents((units * 100.0).round() as i64)
    }

    /// The amount in currency units as `f64` (display / weighting only —
    /// never fed back into money arithmetic).
    #[inline]
    pub fn to_units_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Multiply by a fractional rate (e.g. a platform fee rate), rounding
    /// half-away-from-zero to the nearest cent.
    #[inline]
    pub fn mul_rate(self, rate: f64) -> Cents {
        Cents((self.0 as f64 * rate).round() as i64)
    }

    /// Saturating addition — clamps at `i64::MAX` on overflow.
    #[inline]
    pub fn saturating_add(self, rhs: Cents) -> Cents {
        Cents(self.0.saturating_add(rhs.0))
    }

    /// Saturating subtraction — clamps at `i64::MIN` on overflow.
    #[inline]
    pub fn saturating_sub(self, rhs: Cents) -> Cents {
        Cents(self.0.saturating_sub(rhs.0))
    }
}

impl Add for Cents {
    type Output = Cents;
    #[inline]
    fn add(self, rhs: Cents) -> Cents {
        Cents(self.0 + rhs.0)
    }
}

impl Sub for Cents {
    type Output = Cents;
    #[inline]
    fn sub(self, rhs: Cents) -> Cents {
        Cents(self.0 - rhs.0)
    }
}

impl Neg for Cents {
    type Output = Cents;
    #[inline]
    fn neg(self) -> Cents {
        Cents(-self.0)
    }
}

impl AddAssign for Cents {
    #[inline]
    fn add_assign(&mut self, rhs: Cents) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Cents {
    #[inline]
    fn sub_assign(&mut self, rhs: Cents) {
        self.0 -= rhs.0;
    }
}

impl fmt::Display for Cents {
    /// Renders as a plain decimal, e.g. `4.35` or `-0.02`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_decimal() {
        assert_eq!(Cents::from_str_decimal("4.35").unwrap(), Cents::new(435));
        assert_eq!(Cents::from_str_decimal("7").unwrap(), Cents::new(700));
        assert_eq!(Cents::from_str_decimal("0.01").unwrap(), Cents::new(1));
        assert_eq!(Cents::from_str_decimal(".50").unwrap(), Cents::new(50));
    }

    #[test]
    fn parse_with_decorations() {
        assert_eq!(
            Cents::from_str_decimal("$1,234.50").unwrap(),
            Cents::new(123_450)
        );
        assert_eq!(
            Cents::from_str_decimal("(12.00)").unwrap(),
            Cents::new(-1200)
        );
        assert_eq!(Cents::from_str_decimal("-3.10").unwrap(), Cents::new(-310));
    }

    #[test]
    fn parse_normalizes_extra_decimals() {
        // Third decimal rounds half-away-from-zero.
        assert_eq!(Cents::from_str_decimal("4.3501").unwrap(), Cents::new(435));
        assert_eq!(Cents::from_str_decimal("4.355").unwrap(), Cents::new(436));
        assert_eq!(Cents::from_str_decimal("4.999").unwrap(), Cents::new(500));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Cents::from_str_decimal("abc").is_err());
        assert!(Cents::from_str_decimal("").is_err());
        assert!(Cents::from_str_decimal("12.3x").is_err());
        assert!(Cents::from_str_decimal(".").is_err());
    }

    #[test]
    fn display_round_trips() {
        for raw in [0, 1, 99, 100, 435, -2, -1200] {
            let c = Cents::new(raw);
            assert_eq!(Cents::from_str_decimal(&c.to_string()).unwrap(), c);
        }
        assert_eq!(Cents::new(65).to_string(), "0.65");
        assert_eq!(Cents::new(-2).to_string(), "-0.02");
    }

    #[test]
    fn whole_units_check() {
        assert!(Cents::new(700).is_whole_units());
        assert!(Cents::ZERO.is_whole_units());
        assert!(!Cents::new(435).is_whole_units());
    }

    #[test]
    fn mul_rate_rounds_to_nearest_cent() {
        // 0.65 * 0.025 = 0.01625 → 0.02
        assert_eq!(Cents::new(65).mul_rate(0.025), Cents::new(2));
        // 1.00 * 0.025 = 0.025 → 0.03 (half away from zero)
        assert_eq!(Cents::new(100).mul_rate(0.025), Cents::new(3));
        assert_eq!(Cents::new(100).mul_rate(0.0), Cents::ZERO);
    }
}
