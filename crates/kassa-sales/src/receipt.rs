//! # Receipt Issuer
//!
//! Renders the receipt of a committed sale, stores it and attaches its URL to
//! the invoice.
//!
//! ## Issuing Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  issue_receipt(sale_id)                                                 │
//! │    │                                                                    │
//! │    ├── invoice.receipt_url set? ──► return it (nothing rendered)       │
//! │    │                                                                    │
//! │    ├── load sale, items, payment, names                                │
//! │    ├── ReceiptRenderer::render(document)        → bytes                │
//! │    ├── DocumentStorage::store(bytes, "<invoice number>.<ext>") → URL   │
//! │    └── attach URL only if still NULL                                   │
//! │          └── lost the race? ──► return the URL that won                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! The storage path only depends on the invoice number, so a retry overwrites
//! the same document instead of leaving orphans behind.
//!
//! None of this runs inside the sale transaction. A failure here never
//! changes the sale.

use async_trait::async_trait;
use rust_decimal::RoundingStrategy;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use kassa_core::{DeliveryChannel, Invoice, Money, Payment, Sale, SaleItem};
use kassa_db::{Database, DbError};

// =============================================================================
// Errors
// =============================================================================

/// Receipt issuing failures. Logged, retried, never shown to the sale caller.
#[derive(Debug, Error)]
pub enum ReceiptError {
    #[error("No invoice for sale {sale_id}")]
    InvoiceNotFound { sale_id: String },

    #[error("Sale not found: {sale_id}")]
    SaleNotFound { sale_id: String },

    #[error("Receipt rendering failed: {0}")]
    Render(String),

    #[error("Receipt storage failed: {0}")]
    Storage(String),

    #[error("Receipt queue closed")]
    QueueClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Db(#[from] DbError),
}

pub type ReceiptResult<T> = Result<T, ReceiptError>;

// =============================================================================
// Collaborators
// =============================================================================

/// Everything printed on a receipt.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptDocument {
    pub business_name: String,
    pub sale: Sale,
    pub invoice: Invoice,
    pub lines: Vec<ReceiptLine>,
    pub payment: Payment,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiptLine {
    pub product_name: String,
    pub item: SaleItem,
}

/// Turns a receipt into a document.
#[async_trait]
pub trait ReceiptRenderer: Send + Sync {
    /// File extension of the produced documents, without the dot.
    fn extension(&self) -> &'static str;

    async fn render(&self, receipt: &ReceiptDocument) -> ReceiptResult<Vec<u8>>;
}

/// Stores rendered documents.
#[async_trait]
pub trait DocumentStorage: Send + Sync {
    /// Writes `bytes` at `path` (overwriting) and returns its URL.
    async fn store(&self, bytes: Vec<u8>, path: &str) -> ReceiptResult<String>;
}

/// Events published after the fact.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleEvent {
    SaleCompleted {
        sale_id: String,
        business_id: String,
        invoice_number: String,
        total_amount: Money,
    },
    ReceiptIssued {
        sale_id: String,
        invoice_number: String,
        url: String,
    },
}

/// Fire-and-forget event sink.
///
/// Implementations must not block; the orchestrator calls this right after
/// commit, on the request path.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: SaleEvent);
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: SaleEvent) {
        match &event {
            SaleEvent::SaleCompleted {
                sale_id,
                invoice_number,
                total_amount,
                ..
            } => info!(
                sale_id = %sale_id,
                invoice_number = %invoice_number,
                total = %total_amount,
                "Sale completed"
            ),
            SaleEvent::ReceiptIssued {
                sale_id, url, ..
            } => info!(sale_id = %sale_id, url = %url, "Receipt issued"),
        }
    }
}

// =============================================================================
// Plain-text Renderer
// =============================================================================

const RECEIPT_WIDTH: usize = 40;

/// Renders a fixed-width plain-text receipt (thermal printer friendly).
#[derive(Debug, Default, Clone, Copy)]
pub struct TextReceiptRenderer;

impl TextReceiptRenderer {
    fn amount(value: Money) -> String {
        let rounded = value
            .as_decimal()
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        format!("{:.2}", rounded)
    }

    fn row(out: &mut String, label: &str, value: &str) {
        let pad = RECEIPT_WIDTH.saturating_sub(label.chars().count() + value.chars().count());
        let _ = writeln!(out, "{}{}{}", label, " ".repeat(pad.max(1)), value);
    }
}

#[async_trait]
impl ReceiptRenderer for TextReceiptRenderer {
    fn extension(&self) -> &'static str {
        "txt"
    }

    async fn render(&self, receipt: &ReceiptDocument) -> ReceiptResult<Vec<u8>> {
        let rule = "-".repeat(RECEIPT_WIDTH);
        let mut out = String::new();

        let _ = writeln!(out, "{}", receipt.business_name);
        let _ = writeln!(out, "Invoice {}", receipt.invoice.invoice_number);
        let _ = writeln!(out, "Date    {}", receipt.sale.sold_at.format("%Y-%m-%d %H:%M"));
        let _ = writeln!(out, "{}", rule);

        let mut total_ht = Money::zero();
        for line in &receipt.lines {
            let _ = writeln!(out, "{}", line.product_name);
            Self::row(
                &mut out,
                &format!(
                    "  {} x {}",
                    line.item.quantity,
                    Self::amount(line.item.unit_price)
                ),
                &Self::amount(line.item.line_total),
            );
            total_ht += line.item.tax_exclusive;
        }

        let _ = writeln!(out, "{}", rule);
        Self::row(&mut out, "Total HT", &Self::amount(total_ht));
        Self::row(&mut out, "TVA", &Self::amount(receipt.sale.tax_amount));
        Self::row(&mut out, "Total TTC", &Self::amount(receipt.sale.total_amount));
        Self::row(
            &mut out,
            &format!("Paid ({})", receipt.payment.method),
            &Self::amount(receipt.payment.amount),
        );

        Ok(out.into_bytes())
    }
}

// =============================================================================
// Local Storage
// =============================================================================

/// Stores documents under a directory on disk.
#[derive(Debug, Clone)]
pub struct LocalDocumentStorage {
    root: PathBuf,
    base_url: Option<String>,
}

impl LocalDocumentStorage {
    /// `base_url` prefixes the returned URLs; without it they are `file://`.
    pub fn new(root: impl Into<PathBuf>, base_url: Option<String>) -> Self {
        LocalDocumentStorage {
            root: root.into(),
            base_url,
        }
    }

    fn check_path(path: &str) -> ReceiptResult<()> {
        let relative = Path::new(path);
        let clean = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if !clean {
            return Err(ReceiptError::Storage(format!(
                "refusing to store outside the receipt directory: '{}'",
                path
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStorage for LocalDocumentStorage {
    async fn store(&self, bytes: Vec<u8>, path: &str) -> ReceiptResult<String> {
        Self::check_path(path)?;

        let full = self.root.join(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, &bytes).await?;

        debug!(path = %full.display(), size = bytes.len(), "Document stored");

        let url = match &self.base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), path),
            None => {
                let absolute = if full.is_absolute() {
                    full
                } else {
                    std::env::current_dir()?.join(full)
                };
                format!("file://{}", absolute.display())
            }
        };

        Ok(url)
    }
}

// =============================================================================
// Issuer
// =============================================================================

/// Where the receipt of a sale lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptLocation {
    pub invoice_id: String,
    pub invoice_number: String,
    pub url: String,
    /// False when the URL was already attached before this call.
    pub newly_issued: bool,
}

/// Issues receipts for committed sales.
#[derive(Clone)]
pub struct ReceiptIssuer {
    db: Database,
    renderer: Arc<dyn ReceiptRenderer>,
    storage: Arc<dyn DocumentStorage>,
}

impl ReceiptIssuer {
    pub fn new(
        db: Database,
        renderer: Arc<dyn ReceiptRenderer>,
        storage: Arc<dyn DocumentStorage>,
    ) -> Self {
        ReceiptIssuer {
            db,
            renderer,
            storage,
        }
    }

    /// Plain-text receipts under `storage_dir`.
    pub fn local(db: Database, storage_dir: impl Into<PathBuf>, base_url: Option<String>) -> Self {
        Self::new(
            db,
            Arc::new(TextReceiptRenderer),
            Arc::new(LocalDocumentStorage::new(storage_dir, base_url)),
        )
    }

    /// Renders, stores and attaches the receipt of a sale.
    ///
    /// Idempotent: once a URL is attached every call returns it.
    pub async fn issue_receipt(&self, sale_id: &str) -> ReceiptResult<ReceiptLocation> {
        let invoice = self
            .db
            .invoices()
            .get_by_sale_id(sale_id)
            .await?
            .ok_or_else(|| ReceiptError::InvoiceNotFound {
                sale_id: sale_id.to_string(),
            })?;

        if let Some(url) = invoice.receipt_url.clone() {
            debug!(sale_id = %sale_id, "Receipt already issued");
            return Ok(ReceiptLocation {
                invoice_id: invoice.id,
                invoice_number: invoice.invoice_number,
                url,
                newly_issued: false,
            });
        }

        let document = self.load_document(invoice).await?;
        let bytes = self.renderer.render(&document).await?;
        let path = format!(
            "{}.{}",
            document.invoice.invoice_number,
            self.renderer.extension()
        );
        let url = self.storage.store(bytes, &path).await?;

        let invoices = self.db.invoices();
        let invoice = document.invoice;
        if invoices.attach_receipt_url(&invoice.id, &url).await? {
            info!(sale_id = %sale_id, url = %url, "Receipt attached");
            return Ok(ReceiptLocation {
                invoice_id: invoice.id,
                invoice_number: invoice.invoice_number,
                url,
                newly_issued: true,
            });
        }

        // Someone else attached first; theirs stays.
        let winner = invoices
            .get_by_id(&invoice.id)
            .await?
            .and_then(|i| i.receipt_url)
            .unwrap_or(url);

        Ok(ReceiptLocation {
            invoice_id: invoice.id,
            invoice_number: invoice.invoice_number,
            url: winner,
            newly_issued: false,
        })
    }

    /// Records that the invoice reached the customer over `channel`.
    pub async fn mark_delivered(
        &self,
        invoice_id: &str,
        channel: DeliveryChannel,
    ) -> ReceiptResult<()> {
        self.db.invoices().mark_delivered(invoice_id, channel).await?;
        Ok(())
    }

    async fn load_document(&self, invoice: Invoice) -> ReceiptResult<ReceiptDocument> {
        let sales = self.db.sales();
        let sale_id = invoice.sale_id.clone();

        let sale = sales
            .get_by_id(&sale_id)
            .await?
            .ok_or_else(|| ReceiptError::SaleNotFound {
                sale_id: sale_id.clone(),
            })?;
        let payment = sales
            .get_payment(&sale_id)
            .await?
            .ok_or_else(|| ReceiptError::SaleNotFound {
                sale_id: sale_id.clone(),
            })?;

        let business_name = self
            .db
            .businesses()
            .get_by_id(&sale.business_id)
            .await?
            .map(|b| b.name)
            .unwrap_or_else(|| sale.business_id.clone());

        let products = self.db.products();
        let mut lines = Vec::new();
        for item in sales.get_items(&sale_id).await? {
            // Products deleted since the sale still print by id.
            let product_name = products
                .get_by_id(&item.product_id)
                .await?
                .map(|p| p.name)
                .unwrap_or_else(|| item.product_id.clone());
            lines.push(ReceiptLine { product_name, item });
        }

        Ok(ReceiptDocument {
            business_name,
            sale,
            invoice,
            lines,
            payment,
        })
    }
}
