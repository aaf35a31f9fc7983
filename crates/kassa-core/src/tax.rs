//! # Tax Module
//!
//! Per-line tax computation for TTC (tax-inclusive) prices.
//!
//! ## The TTC → HT Split
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  unit_price is what the customer pays. For a taxable product it        │
//! │  ALREADY CONTAINS the tax, so tax is extracted, never added:           │
//! │                                                                         │
//! │    total = unit_price × quantity                      (exact)          │
//! │    ht    = round4_half_up( total / (1 + rate) )                        │
//! │    tax   = round4_half_up( total - ht )                                │
//! │                                                                         │
//! │  Deriving HT first and tax by subtraction guarantees                   │
//! │    ht + tax == total                                                   │
//! │  at 4 decimal places, for every price / quantity / rate.               │
//! │                                                                         │
//! │  Non-taxable: ht = total, tax = 0, nothing is rounded.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rate Resolution
//! ```text
//! TaxConfiguration?        enabled   rate      → effective rate
//! ─────────────────        ───────   ────        ──────────────
//! None                     -         -           default (18%)
//! Some                     false     any         default (18%)
//! Some                     true      > 0         rate / 100
//! Some                     true      0           ZeroRatePolicy decides
//! ```
//! The effective rate only ever applies to taxable lines.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::TaxConfiguration;
use crate::validation::{validate_quantity, validate_unit_price};

// =============================================================================
// Tax Rate
// =============================================================================

/// A tax rate expressed as a fraction (0.18 = 18%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxRate(Decimal);

impl TaxRate {
    /// The rate used when a business has no usable configuration: 18%.
    pub const DEFAULT: TaxRate = TaxRate(Decimal::from_parts(18, 0, 0, false, 2));

    /// Creates a rate from a fraction (0.18).
    #[inline]
    pub fn from_fraction(fraction: Decimal) -> Self {
        TaxRate(fraction)
    }

    /// Creates a rate from a percentage (18.00 → 0.18).
    #[inline]
    pub fn from_percentage(pct: Decimal) -> Self {
        TaxRate(pct / Decimal::ONE_HUNDRED)
    }

    /// Zero tax rate.
    #[inline]
    pub fn zero() -> Self {
        TaxRate(Decimal::ZERO)
    }

    /// Returns the rate as a fraction.
    #[inline]
    pub fn fraction(&self) -> Decimal {
        self.0
    }

    /// Returns the rate as a percentage (for display and receipts).
    #[inline]
    pub fn percentage(&self) -> Decimal {
        self.0 * Decimal::ONE_HUNDRED
    }

    /// Checks if tax rate is zero.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::DEFAULT
    }
}

// =============================================================================
// Resolution Policy
// =============================================================================

/// What an enabled configuration with a 0% rate means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroRatePolicy {
    /// 0% is not a usable rate: apply the default rate.
    #[default]
    Fallback,
    /// 0% means the business charges no tax at all.
    Exempt,
}

impl std::str::FromStr for ZeroRatePolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fallback" | "default" => Ok(ZeroRatePolicy::Fallback),
            "exempt" | "none" => Ok(ZeroRatePolicy::Exempt),
            other => Err(ValidationError::InvalidFormat {
                field: "zero_rate".to_string(),
                reason: format!("unknown policy '{}', expected fallback or exempt", other),
            }),
        }
    }
}

/// Inputs of the tax rate resolution that are not per-business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaxPolicy {
    /// Rate applied when the business configuration is absent or unusable.
    pub default_rate: TaxRate,
    /// Treatment of an enabled 0% configuration.
    pub zero_rate: ZeroRatePolicy,
}

/// Resolves the effective rate of a sale from the business configuration.
///
/// Called once per sale, before any line is priced.
///
/// ## Example
/// ```rust
/// use kassa_core::tax::{resolve_tax_rate, TaxPolicy, TaxRate};
///
/// let rate = resolve_tax_rate(None, &TaxPolicy::default());
/// assert_eq!(rate, TaxRate::DEFAULT);
/// ```
pub fn resolve_tax_rate(config: Option<&TaxConfiguration>, policy: &TaxPolicy) -> TaxRate {
    match config {
        Some(c) if c.enabled && c.rate > Decimal::ZERO => TaxRate::from_percentage(c.rate),
        Some(c) if c.enabled && c.rate.is_zero() => match policy.zero_rate {
            ZeroRatePolicy::Fallback => policy.default_rate,
            ZeroRatePolicy::Exempt => TaxRate::zero(),
        },
        _ => policy.default_rate,
    }
}

// =============================================================================
// Line Computation
// =============================================================================

/// Amounts of one priced cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineResult {
    /// HT share of the line.
    pub tax_exclusive: Money,
    /// Tax contained in the line.
    pub tax_amount: Money,
    /// What the customer pays for the line (`unit_price × quantity`).
    pub tax_inclusive_total: Money,
}

/// Computes the amounts of one line.
///
/// ## Arguments
/// * `unit_price` - TTC price when `taxable`, plain price otherwise
/// * `quantity` - number of units, 1..=MAX_ITEM_QUANTITY
/// * `taxable` - whether the product carries tax
/// * `tax_rate` - effective rate from [`resolve_tax_rate`]
///
/// ## Errors
/// `CoreError::Validation` for a non-positive quantity, a negative price or a
/// price with more than four decimal places; `CoreError::AmountOverflow` if
/// the total is not representable.
///
/// ## Example
/// ```rust
/// use kassa_core::money::Money;
/// use kassa_core::tax::{compute_line, TaxRate};
///
/// let line = compute_line(Money::new(500, 0), 3, false, TaxRate::DEFAULT).unwrap();
/// assert_eq!(line.tax_exclusive, Money::new(1500, 0));
/// assert!(line.tax_amount.is_zero());
/// ```
pub fn compute_line(
    unit_price: Money,
    quantity: i64,
    taxable: bool,
    tax_rate: TaxRate,
) -> CoreResult<LineResult> {
    validate_quantity(quantity)?;
    validate_unit_price(unit_price)?;

    let total = unit_price
        .checked_mul_quantity(quantity)
        .ok_or_else(|| overflow("line total"))?;

    if !taxable {
        return Ok(LineResult {
            tax_exclusive: total,
            tax_amount: Money::zero(),
            tax_inclusive_total: total,
        });
    }

    let divisor = Decimal::ONE
        .checked_add(tax_rate.fraction())
        .filter(|d| *d > Decimal::ZERO)
        .ok_or_else(|| overflow("tax divisor"))?;

    let tax_exclusive = total
        .checked_div(divisor)
        .ok_or_else(|| overflow("tax-exclusive amount"))?
        .round_half_up();
    let tax_amount = (total - tax_exclusive).round_half_up();

    Ok(LineResult {
        tax_exclusive,
        tax_amount,
        tax_inclusive_total: total,
    })
}

fn overflow(context: &str) -> CoreError {
    CoreError::AmountOverflow {
        context: context.to_string(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
