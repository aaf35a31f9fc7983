//! # kassa-sales: Sale Transaction Engine
//!
//! Records a sale atomically (stock decrements, sale, items, payment,
//! invoice) and issues its receipt after commit.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Engine Overview                              │
//! │                                                                         │
//! │  caller ──► SaleService::create_sale(CreateSaleRequest)                │
//! │                   │                                                     │
//! │                   │  validate → price → lock → reserve → persist       │
//! │                   │  (one SQLite transaction, per-product locks)       │
//! │                   │                                                     │
//! │                   ├──► CompletedSale returned to the caller            │
//! │                   │                                                     │
//! │                   └──► ReceiptQueue::dispatch(sale_id)                 │
//! │                              │                                          │
//! │                              ▼                                          │
//! │                        ReceiptWorker ──► ReceiptIssuer                  │
//! │                        (retries from      render → store → attach URL  │
//! │                         receipt_jobs)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kassa_sales::{SalesConfig, SaleService, CreateSaleRequest};
//!
//! let config = SalesConfig::load(None)?;
//! let db = Database::new(config.db_config()).await?;
//! let service = SaleService::new(db, config.sale_policy()?);
//!
//! let sale = service.create_sale(request).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod receipt;
pub mod telemetry;
pub mod worker;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ReceiptSettings, SalesConfig};
pub use error::{ConfigError, ErrorCode, SaleError, SaleResult};
pub use orchestrator::{CompletedSale, CreateSaleRequest, SalePolicy, SaleService};
pub use receipt::{
    DocumentStorage, LocalDocumentStorage, Notifier, ReceiptError, ReceiptIssuer,
    ReceiptLocation, ReceiptRenderer, SaleEvent, TextReceiptRenderer, TracingNotifier,
};
pub use worker::{JobOutcome, ProcessSummary, ReceiptQueue, ReceiptWorker};
