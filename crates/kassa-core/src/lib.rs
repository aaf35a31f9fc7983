//! # kassa-core: Pure Business Logic for the Kassa Back Office
//!
//! This crate contains the sale engine's business rules as pure functions
//! with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kassa Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              kassa-sales (orchestrator, receipts)               │   │
//! │  │    create_sale ──► validate ──► price ──► reserve ──► commit   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ kassa-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │    tax    │  │ sale_flow │  │   │
//! │  │   │  Product  │  │   Money   │  │  TaxRate  │  │ SaleStage │  │   │
//! │  │   │   Sale    │  │  4dp HALF │  │ LineResult│  │ SaleAttempt│ │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    kassa-db (Database Layer)                    │   │
//! │  │         SQLite queries, migrations, inventory ledger            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Stock, Sale, Payment, Invoice, ...)
//! - [`money`] - Decimal money type (4 decimal places, round half up)
//! - [`tax`] - Tax rate resolution and the per-line TTC/HT split
//! - [`sale_flow`] - Sale attempt stage machine
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use kassa_core::money::Money;
//! use kassa_core::tax::{compute_line, TaxRate};
//!
//! // 1180 TTC, two units, 18% VAT
//! let unit_price: Money = "1180".parse().unwrap();
//! let line = compute_line(unit_price, 2, true, TaxRate::from_percentage("18".parse().unwrap())).unwrap();
//!
//! assert_eq!(line.tax_inclusive_total, "2360".parse().unwrap());
//! assert_eq!(line.tax_exclusive, "2000".parse().unwrap());
//! assert_eq!(line.tax_amount, "360".parse().unwrap());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod sale_flow;
pub mod tax;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use sale_flow::{SaleAttempt, SaleStage};
pub use tax::{compute_line, resolve_tax_rate, LineResult, TaxPolicy, TaxRate, ZeroRatePolicy};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of lines allowed in a single cart.
///
/// ## Business Reason
/// Prevents runaway carts. The sales configuration can lower it.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity of a single cart line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 9_999;

/// Number of decimal places kept on every monetary amount.
pub const AMOUNT_SCALE: u32 = 4;
