//! # Domain Types
//!
//! Core domain types used throughout the Kassa back office.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Sale       │   │    Payment      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  sale_id (1:1)  │       │
//! │  │  reference      │   │  cashier_id     │   │  method         │       │
//! │  │  unit_price TTC │   │  total_amount   │   │  amount         │       │
//! │  │  taxable        │   │  tax_amount     │   └─────────────────┘       │
//! │  └────────┬────────┘   └────────┬────────┘                              │
//! │           │ 1:1                 │ 1:N            ┌─────────────────┐    │
//! │  ┌────────▼────────┐   ┌────────▼────────┐       │    Invoice      │    │
//! │  │     Stock       │   │    SaleItem     │       │  ─────────────  │    │
//! │  │  quantity ≥ 0   │   │  price snapshot │       │  sale_id (1:1)  │    │
//! │  └────────┬────────┘   └─────────────────┘       │  invoice_number │    │
//! │           │ 1:N                                  │  receipt_url?   │    │
//! │  ┌────────▼────────┐                             └─────────────────┘    │
//! │  │ StockMovement   │  append-only audit trail                           │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Business & Cashier
// =============================================================================

/// A business (tenant) owning products and sales.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Business {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Soft-delete marker. Deleted businesses are invisible to lookups.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A user of a business. Sales record the cashier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct User {
    pub id: String,
    pub business_id: String,
    pub name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Product & Stock
// =============================================================================

/// A product available for sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Business this product belongs to.
    pub business_id: String,

    /// Display name shown to cashier and on receipt.
    pub name: String,

    /// Business reference (article code).
    pub reference: String,

    /// Unit price. Tax-inclusive when `taxable`.
    pub unit_price: Money,

    /// Whether the product carries tax.
    pub taxable: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Product {
    /// Checks if the product belongs to the given business.
    #[inline]
    pub fn belongs_to(&self, business_id: &str) -> bool {
        self.business_id == business_id
    }
}

/// Current quantity on hand of one product.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Stock {
    pub product_id: String,
    /// Never negative.
    pub quantity: i64,
    pub updated_at: DateTime<Utc>,
}

impl Stock {
    /// Checks if `quantity` units can be taken out.
    #[inline]
    pub fn covers(&self, quantity: i64) -> bool {
        self.quantity >= quantity
    }
}

/// The reason of a stock change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    /// Restocking / goods received.
    In,
    /// Goods leaving outside a sale (loss, return to supplier).
    Out,
    /// Decrement caused by a committed sale.
    Sale,
    /// Manual correction after a count.
    Adjustment,
}

impl MovementType {
    /// Returns the stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "IN",
            MovementType::Out => "OUT",
            MovementType::Sale => "SALE",
            MovementType::Adjustment => "ADJUSTMENT",
        }
    }
}

/// Immutable audit record of a quantity change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockMovement {
    pub id: String,
    pub product_id: String,
    /// Signed change: negative for SALE / OUT.
    pub delta: i64,
    pub movement_type: MovementType,
    /// Originating document, the sale id for SALE movements.
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Tax Configuration
// =============================================================================

/// Per-business tax settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxConfiguration {
    pub business_id: String,
    pub enabled: bool,
    /// Rate as a percentage (18.00 = 18%).
    pub rate: Decimal,
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Physical cash payment.
    #[default]
    Cash,
    /// Card payment on external terminal.
    Card,
    MobileMoney,
    BankTransfer,
    Cheque,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Card => "CARD",
            PaymentMethod::MobileMoney => "MOBILE_MONEY",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
            PaymentMethod::Cheque => "CHEQUE",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "CASH" => Ok(PaymentMethod::Cash),
            "CARD" => Ok(PaymentMethod::Card),
            "MOBILE_MONEY" => Ok(PaymentMethod::MobileMoney),
            "BANK_TRANSFER" => Ok(PaymentMethod::BankTransfer),
            "CHEQUE" => Ok(PaymentMethod::Cheque),
            other => Err(ValidationError::InvalidFormat {
                field: "payment_method".to_string(),
                reason: format!("unknown payment method '{}'", other),
            }),
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Cart
// =============================================================================

/// One requested product/quantity pair of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub quantity: i64,
}

impl CartLine {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        CartLine {
            product_id: product_id.into(),
            quantity,
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A committed sale. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    pub id: String,
    pub business_id: String,
    pub cashier_id: String,
    /// Σ line totals (tax-inclusive).
    pub total_amount: Money,
    /// Σ line tax.
    pub tax_amount: Money,
    pub sold_at: DateTime<Utc>,
}

/// A line item in a sale.
/// Uses snapshot pattern to freeze product data at time of sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    /// Position in the cart, starting at 1.
    pub line_no: i64,
    pub product_id: String,
    pub quantity: i64,
    /// Unit price at time of sale (frozen).
    pub unit_price: Money,
    pub tax_exclusive: Money,
    pub tax_amount: Money,
    /// unit_price × quantity.
    pub line_total: Money,
}

// =============================================================================
// Payment
// =============================================================================

/// The single payment settling a sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub sale_id: String,
    /// Always equal to the sale total.
    pub amount: Money,
    pub method: PaymentMethod,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Invoice
// =============================================================================

/// The invoice of a sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Invoice {
    pub id: String,
    pub sale_id: String,
    /// Unique, derived from the sale id.
    pub invoice_number: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub sent_by_email: bool,
    pub sent_by_whatsapp: bool,
    /// Location of the rendered receipt, set after commit.
    pub receipt_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Delivery channel of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    Email,
    WhatsApp,
}

/// Derives the invoice number of a sale.
///
/// The full sale id is kept so two sales never share a number.
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use kassa_core::types::invoice_number_for;
///
/// let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
/// let number = invoice_number_for("0f6c1a9e-59d4-4b8a-9c73-2c8d6f0e4b11", date);
/// assert_eq!(number, "INV-20240309-0F6C1A9E59D44B8A9C732C8D6F0E4B11");
/// ```
pub fn invoice_number_for(sale_id: &str, date: NaiveDate) -> String {
    let compact: String = sale_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    format!("INV-{}-{}", date.format("%Y%m%d"), compact)
}

// =============================================================================
// Receipt Jobs
// =============================================================================

/// A pending receipt generation, written in the sale transaction.
/// Uses outbox pattern so a crash after commit never loses a receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ReceiptJob {
    pub id: String,
    pub sale_id: String,
    /// Number of generation attempts.
    pub attempts: i64,
    /// Last error message if generation failed.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ReceiptJob {
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_method_default() {
        assert_eq!(PaymentMethod::default(), PaymentMethod::Cash);
    }

    #[test]
    fn test_payment_method_parsing() {
        assert_eq!("cash".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cash);
        assert_eq!(
            "mobile-money".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::MobileMoney
        );
        assert_eq!(
            "BANK_TRANSFER".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::BankTransfer
        );
        assert!("bitcoin".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_payment_method_display_matches_storage() {
        assert_eq!(PaymentMethod::MobileMoney.to_string(), "MOBILE_MONEY");
        assert_eq!(PaymentMethod::Cheque.to_string(), "CHEQUE");
    }

    #[test]
    fn test_movement_type_strings() {
        assert_eq!(MovementType::Sale.as_str(), "SALE");
        assert_eq!(MovementType::Adjustment.as_str(), "ADJUSTMENT");
    }

    #[test]
    fn test_invoice_numbers_differ_per_sale() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let a = invoice_number_for("11111111-1111-4111-8111-111111111111", date);
        let b = invoice_number_for("11111111-1111-4111-8111-111111111112", date);
        assert_ne!(a, b);
        assert!(a.starts_with("INV-20240101-"));
    }

    #[test]
    fn test_stock_covers() {
        let stock = Stock {
            product_id: "p".to_string(),
            quantity: 5,
            updated_at: Utc::now(),
        };
        assert!(stock.covers(5));
        assert!(!stock.covers(6));
    }
}
