//! # Repository Module
//!
//! Database repository implementations for the Kassa back office.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Sale orchestrator                                                      │
//! │       │                                                                 │
//! │       │  db.products().get_by_id(id)            (pool, autocommit)     │
//! │       │  db.ledger().reserve_and_decrement(&mut tx, &guard, ...)       │
//! │       │  SaleRepository::insert_sale(&mut tx, ...)   (caller's tx)     │
//! │       ▼                                                                 │
//! │  Repositories                                                           │
//! │  ├── lookups run on the pool                                           │
//! │  └── sale-path writes take `&mut SqliteConnection` so the caller      │
//! │      decides the transaction boundary                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`business::BusinessRepository`], [`business::UserRepository`] - lookups
//! - [`product::ProductRepository`] - product lookups and catalog inserts
//! - [`tax_config::TaxConfigRepository`] - per-business tax settings
//! - [`stock::InventoryLedger`] - stock rows and movements
//! - [`sale::SaleRepository`] - sales, items, payments
//! - [`invoice::InvoiceRepository`] - invoices and receipt linkage
//! - [`receipt_job::ReceiptJobRepository`] - receipt outbox

pub mod business;
pub mod invoice;
pub mod product;
pub mod receipt_job;
pub mod sale;
pub mod stock;
pub mod tax_config;

use kassa_core::Money;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::{DbError, DbResult};

/// Parses a decimal TEXT column into `Money`.
pub(crate) fn money_column(column: &str, value: &str) -> DbResult<Money> {
    value.parse().map_err(|e| DbError::decode(column, e))
}

/// Parses a decimal TEXT column.
pub(crate) fn decimal_column(column: &str, value: &str) -> DbResult<Decimal> {
    Decimal::from_str(value.trim()).map_err(|e| DbError::decode(column, e))
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixtures shared by repository tests.

    use chrono::Utc;
    use kassa_core::{Business, Money, Product, User};
    use uuid::Uuid;

    use crate::{Database, DbConfig};

    pub async fn memory_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    pub async fn business(db: &Database) -> Business {
        let business = Business {
            id: Uuid::new_v4().to_string(),
            name: "Boutique Test".to_string(),
            created_at: Utc::now(),
            deleted_at: None,
        };
        db.businesses().insert(&business).await.unwrap();
        business
    }

    pub async fn cashier(db: &Database, business_id: &str) -> User {
        let user = User {
            id: Uuid::new_v4().to_string(),
            business_id: business_id.to_string(),
            name: "Awa".to_string(),
            email: None,
            created_at: Utc::now(),
            deleted_at: None,
        };
        db.users().insert(&user).await.unwrap();
        user
    }

    pub async fn product(db: &Database, business_id: &str, price: &str, taxable: bool) -> Product {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let product = Product {
            reference: format!("REF-{}", &id[..8]),
            id,
            business_id: business_id.to_string(),
            name: "Savon".to_string(),
            unit_price: price.parse::<Money>().unwrap(),
            taxable,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        db.products().insert(&product).await.unwrap();
        product
    }
}
