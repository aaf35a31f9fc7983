//! # kassa-db: Database Layer for the Kassa Back Office
//!
//! This crate provides database access for the sale engine.
//! It uses SQLite for storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kassa Data Flow                                  │
//! │                                                                         │
//! │  SaleService::create_sale                                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     kassa-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │    │ ProductRepo    │    │ 001_initial  │  │   │
//! │  │   │ SqlitePool    │◄───│ InventoryLedger│    │  _schema.sql │  │   │
//! │  │   │ StockLocks    │    │ SaleRepo       │    │              │  │   │
//! │  │   │               │    │ InvoiceRepo    │    │              │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database (WAL)                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`lock`] - Per-product stock lock registry
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kassa_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("kassa.db")).await?;
//! let stock = db.ledger().get(&product_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod lock;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use lock::{StockGuard, StockLocks};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::business::{BusinessRepository, UserRepository};
pub use repository::invoice::InvoiceRepository;
pub use repository::product::ProductRepository;
pub use repository::receipt_job::ReceiptJobRepository;
pub use repository::sale::SaleRepository;
pub use repository::stock::{InventoryLedger, StockError, StockResult};
pub use repository::tax_config::TaxConfigRepository;

// Transaction handle type used by the sale orchestrator.
pub use sqlx::SqliteConnection;
