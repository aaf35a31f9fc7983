//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Decimal Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    2360 / 1.18 = 1999.9999999999998  ❌ WRONG!                          │
//! │                                                                         │
//! │  Prices here are TTC and the HT part is DERIVED by division, so the     │
//! │  engine needs exact decimal division, not integer cents.               │
//! │                                                                         │
//! │  OUR SOLUTION: rust_decimal + one rounding policy                       │
//! │    2360 / 1.18 = 2000 exactly                                           │
//! │    Every derived amount is rounded to 4 places, half up                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use kassa_core::money::Money;
//!
//! let price: Money = "1180.00".parse().unwrap();
//! let total = price.checked_mul_quantity(2).unwrap();
//! assert_eq!(total, "2360".parse().unwrap());
//! ```

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

use crate::AMOUNT_SCALE;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary amount in the business currency.
///
/// ## Design Decisions
/// - **Decimal, not cents**: the tax-exclusive share of a TTC price is a
///   division result and must stay exact up to [`AMOUNT_SCALE`] places
/// - **Single field tuple struct**: zero-cost wrapper over `Decimal`
/// - **Serde transparent**: serialized as a decimal string (`"2360.00"`)
///
/// ## Where Money is Used
/// ```text
/// Product.unit_price ──► SaleItem.unit_price ──► LineResult.tax_inclusive_total
///                                                        │
///                      Sale.total_amount ◄── Σ ──────────┘
///                             │
///                             ▼
///                      Payment.amount
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Wraps a decimal value.
    #[inline]
    pub fn from_decimal(value: Decimal) -> Self {
        Money(value)
    }

    /// Creates money from an integer mantissa and a scale.
    ///
    /// ## Example
    /// ```rust
    /// use kassa_core::money::Money;
    ///
    /// let price = Money::new(118050, 2); // 1180.50
    /// assert_eq!(price.to_string(), "1180.50");
    /// ```
    #[inline]
    pub fn new(mantissa: i64, scale: u32) -> Self {
        Money(Decimal::new(mantissa, scale))
    }

    /// Returns zero money value.
    #[inline]
    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    /// Returns the underlying decimal.
    #[inline]
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Number of decimal places carried by this value.
    #[inline]
    pub fn scale(&self) -> u32 {
        self.0.scale()
    }

    /// Checks if the value is zero.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Rounds to [`AMOUNT_SCALE`] decimal places, half up.
    ///
    /// ## Rounding Policy
    /// ```text
    /// 0.00005  → 0.0001   (midpoint goes up)
    /// 0.00004  → 0.0000
    /// 1.23456  → 1.2346
    /// ```
    /// Amounts in a sale are never negative, so "away from zero" and
    /// "half up" coincide.
    #[inline]
    pub fn round_half_up(&self) -> Self {
        Money(
            self.0
                .round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Multiplies money by a quantity, `None` on overflow.
    ///
    /// ## Example
    /// ```rust
    /// use kassa_core::money::Money;
    ///
    /// let unit_price = Money::new(500, 0);
    /// assert_eq!(unit_price.checked_mul_quantity(3), Some(Money::new(1500, 0)));
    /// ```
    #[inline]
    pub fn checked_mul_quantity(&self, qty: i64) -> Option<Self> {
        self.0.checked_mul(Decimal::from(qty)).map(Money)
    }

    /// Divides by a decimal factor, `None` on overflow or division by zero.
    #[inline]
    pub fn checked_div(&self, divisor: Decimal) -> Option<Self> {
        self.0.checked_div(divisor).map(Money)
    }

    /// Adds two amounts, `None` on overflow.
    #[inline]
    pub fn checked_add(&self, other: Money) -> Option<Self> {
        self.0.checked_add(other.0).map(Money)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain decimal rendering, also used as the storage format.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Money)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money(value)
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn m(s: &str) -> Money {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(m("1180.00").to_string(), "1180.00");
        assert_eq!(m(" 12.5 ").to_string(), "12.5");
        assert!("twelve".parse::<Money>().is_err());
    }

    #[test]
    fn test_equality_ignores_trailing_zeros() {
        assert_eq!(m("2000"), m("2000.0000"));
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(m("0.00005").round_half_up(), m("0.0001"));
        assert_eq!(m("0.00004").round_half_up(), m("0"));
        assert_eq!(m("1.23456").round_half_up(), m("1.2346"));
        assert_eq!(m("1.23455").round_half_up(), m("1.2346"));
        assert_eq!(m("1.2").round_half_up(), m("1.2"));
    }

    #[test]
    fn test_arithmetic() {
        let a = m("10.50");
        let b = m("0.25");

        assert_eq!(a + b, m("10.75"));
        assert_eq!(a - b, m("10.25"));

        let mut c = a;
        c += b;
        c -= m("0.75");
        assert_eq!(c, m("10"));
    }

    #[test]
    fn test_sum() {
        let amounts = vec![m("1.1"), m("2.2"), m("3.3")];
        let by_ref: Money = amounts.iter().sum();
        let by_value: Money = amounts.into_iter().sum();
        assert_eq!(by_ref, m("6.6"));
        assert_eq!(by_value, m("6.6"));
    }

    #[test]
    fn test_checked_mul_overflow() {
        let huge = Money::from_decimal(Decimal::MAX);
        assert!(huge.checked_mul_quantity(2).is_none());
        assert_eq!(m("2.5").checked_mul_quantity(4), Some(m("10")));
    }

    #[test]
    fn test_negative_checks() {
        assert!(m("-0.01").is_negative());
        assert!(!m("0").is_negative());
        assert!(!m("-0").is_negative());
        assert!(m("0.0000").is_zero());
    }
}
