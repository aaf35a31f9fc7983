//! # Sale Transaction Orchestrator
//!
//! Turns a cart into a committed sale, or into nothing at all.
//!
//! ## Stages
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          create_sale                                    │
//! │                                                                         │
//! │  RECEIVED ──► VALIDATED ──► PRICED ──► STOCK_RESERVED ──► PERSISTED    │
//! │     │             │           │  │            │               │         │
//! │     └─────────────┴───────────┘  └────────────┤               ▼         │
//! │                   │                           │        RECEIPT_PENDING  │
//! │                   ▼                           ▼               │         │
//! │               REJECTED                     FAILED             ▼         │
//! │        (bad input, no stock)        (write/commit error)    DONE       │
//! │                                                                         │
//! │  No lock is held and nothing is written before PRICED.                 │
//! │  Locks: sorted product ids, taken right before the transaction,        │
//! │  released right after commit or rollback.                              │
//! │  The receipt is only dispatched once the sale is committed.            │
//! │  A database error in any stage before commit ends in FAILED.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cancellation
//! Dropping the future of an in-flight `create_sale` drops its transaction
//! (rolled back by sqlx) and its lock guard. A sale is either fully committed
//! or not there.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use kassa_core::validation::{
    validate_cart_size, validate_email, validate_id, validate_phone, validate_quantity,
};
use kassa_core::{
    compute_line, invoice_number_for, resolve_tax_rate, Business, CartLine, CoreError, Invoice,
    Money, Payment, PaymentMethod, Product, Sale, SaleAttempt, SaleItem, SaleStage, TaxPolicy,
    User, ValidationError, MAX_CART_LINES,
};
use kassa_db::{
    Database, DbError, DbResult, InvoiceRepository, ReceiptJobRepository, SaleRepository,
    StockError,
};

use crate::error::{SaleError, SaleResult};
use crate::receipt::{Notifier, SaleEvent, TracingNotifier};
use crate::worker::ReceiptQueue;

// =============================================================================
// Requests & Results
// =============================================================================

/// A cart to be sold.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSaleRequest {
    pub business_id: String,
    pub cashier_id: String,
    /// Cart lines in the order they were scanned.
    pub lines: Vec<CartLine>,
    /// Falls back to the configured default (CASH).
    pub payment_method: Option<PaymentMethod>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
}

/// A committed sale with everything written alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedSale {
    pub sale: Sale,
    pub items: Vec<SaleItem>,
    pub payment: Payment,
    pub invoice: Invoice,
}

/// Sale-time settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SalePolicy {
    pub tax: TaxPolicy,
    pub default_payment_method: PaymentMethod,
    pub max_cart_lines: usize,
}

impl Default for SalePolicy {
    fn default() -> Self {
        SalePolicy {
            tax: TaxPolicy::default(),
            default_payment_method: PaymentMethod::default(),
            max_cart_lines: MAX_CART_LINES,
        }
    }
}

/// Output of the validation stage.
struct ValidatedCart {
    business: Business,
    cashier: User,
    lines: Vec<(CartLine, Product)>,
    customer_email: Option<String>,
    customer_phone: Option<String>,
    payment_method: Option<PaymentMethod>,
}

/// Output of the pricing stage.
struct PricedCart {
    items: Vec<SaleItem>,
    total_amount: Money,
    tax_amount: Money,
}

// =============================================================================
// Service
// =============================================================================

/// Entry point of the sale engine.
#[derive(Clone)]
pub struct SaleService {
    db: Database,
    policy: SalePolicy,
    receipts: Option<ReceiptQueue>,
    notifier: Arc<dyn Notifier>,
}

impl SaleService {
    /// Creates a service without a receipt worker.
    ///
    /// Receipt jobs are still written; a worker polling the same database
    /// will issue them.
    pub fn new(db: Database, policy: SalePolicy) -> Self {
        SaleService {
            db,
            policy,
            receipts: None,
            notifier: Arc::new(TracingNotifier),
        }
    }

    /// Dispatches committed sales to a receipt worker.
    pub fn with_receipts(mut self, queue: ReceiptQueue) -> Self {
        self.receipts = Some(queue);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn policy(&self) -> &SalePolicy {
        &self.policy
    }

    /// Runs one sale attempt end to end.
    ///
    /// ## Errors
    /// * `Validation` - bad input or unknown/foreign entity; nothing written
    /// * `InsufficientStock` - a line asks for more than is on hand; nothing written
    /// * `Persistence` - the transaction failed and was rolled back
    ///
    /// Receipt problems never show up here.
    pub async fn create_sale(&self, request: CreateSaleRequest) -> SaleResult<CompletedSale> {
        let sale_id = Uuid::new_v4().to_string();
        let mut attempt = SaleAttempt::new();

        debug!(
            sale_id = %sale_id,
            business_id = %request.business_id,
            lines = request.lines.len(),
            "Sale received"
        );

        // RECEIVED -> VALIDATED
        let cart = match self.validate(request).await {
            Ok(cart) => cart,
            Err(e) => return Err(self.abandon(&mut attempt, &sale_id, e)),
        };
        attempt.advance(SaleStage::Validated)?;

        // VALIDATED -> PRICED
        let priced = match self.price(&sale_id, &cart).await {
            Ok(priced) => priced,
            Err(e) => return Err(self.abandon(&mut attempt, &sale_id, e)),
        };
        attempt.advance(SaleStage::Priced)?;

        let now = Utc::now();
        let sale = Sale {
            id: sale_id.clone(),
            business_id: cart.business.id.clone(),
            cashier_id: cart.cashier.id.clone(),
            total_amount: priced.total_amount,
            tax_amount: priced.tax_amount,
            sold_at: now,
        };
        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            sale_id: sale_id.clone(),
            amount: priced.total_amount,
            method: cart
                .payment_method
                .unwrap_or(self.policy.default_payment_method),
            created_at: now,
        };
        let invoice = Invoice {
            id: Uuid::new_v4().to_string(),
            sale_id: sale_id.clone(),
            invoice_number: invoice_number_for(&sale_id, now.date_naive()),
            customer_email: cart.customer_email.clone(),
            customer_phone: cart.customer_phone.clone(),
            sent_by_email: false,
            sent_by_whatsapp: false,
            receipt_url: None,
            created_at: now,
        };

        // PRICED -> STOCK_RESERVED
        let ledger = self.db.ledger();
        let guard = ledger
            .lock(cart.lines.iter().map(|(line, _)| line.product_id.as_str()))
            .await;

        let mut tx = match self.db.pool().begin().await {
            Ok(tx) => tx,
            Err(e) => return Err(self.abandon(&mut attempt, &sale_id, DbError::from(e).into())),
        };

        // Units already taken by earlier lines of this cart, per product.
        let mut reserved: HashMap<&str, i64> = HashMap::new();

        for (line, product) in &cart.lines {
            let result = ledger
                .reserve_and_decrement(&mut tx, &guard, &line.product_id, line.quantity, &sale_id)
                .await;

            if let Err(e) = result {
                rollback(tx, &sale_id).await;
                drop(guard);
                let err = match e {
                    StockError::Insufficient {
                        product_id,
                        available,
                        requested,
                    } => {
                        let earlier = reserved.get(product_id.as_str()).copied().unwrap_or(0);
                        SaleError::InsufficientStock {
                            product_id,
                            product_name: product.name.clone(),
                            available: available + earlier,
                            requested: requested + earlier,
                        }
                    }
                    other => other.into(),
                };
                return Err(self.abandon(&mut attempt, &sale_id, err));
            }

            *reserved.entry(line.product_id.as_str()).or_insert(0) += line.quantity;
        }
        attempt.advance(SaleStage::StockReserved)?;

        // STOCK_RESERVED -> PERSISTED
        let written = persist(&mut tx, &sale, &priced.items, &payment, &invoice).await;
        let committed = match written {
            Ok(()) => tx.commit().await.map_err(DbError::from),
            Err(e) => {
                rollback(tx, &sale_id).await;
                Err(e)
            }
        };
        drop(guard);

        if let Err(e) = committed {
            return Err(self.abandon(&mut attempt, &sale_id, e.into()));
        }
        self.advance_committed(&mut attempt, &sale_id, SaleStage::Persisted);

        info!(
            sale_id = %sale_id,
            business_id = %sale.business_id,
            total = %sale.total_amount,
            tax = %sale.tax_amount,
            items = priced.items.len(),
            invoice_number = %invoice.invoice_number,
            "Sale committed"
        );

        // PERSISTED -> RECEIPT_PENDING -> DONE
        self.advance_committed(&mut attempt, &sale_id, SaleStage::ReceiptPending);
        if let Some(queue) = &self.receipts {
            queue.dispatch(&sale_id);
        }
        self.notifier.notify(SaleEvent::SaleCompleted {
            sale_id: sale_id.clone(),
            business_id: sale.business_id.clone(),
            invoice_number: invoice.invoice_number.clone(),
            total_amount: sale.total_amount,
        });
        self.advance_committed(&mut attempt, &sale_id, SaleStage::Done);

        Ok(CompletedSale {
            sale,
            items: priced.items,
            payment,
            invoice,
        })
    }

    /// Reads back a committed sale.
    pub async fn get_sale(&self, sale_id: &str) -> SaleResult<CompletedSale> {
        let sales = self.db.sales();

        let sale = sales
            .get_by_id(sale_id)
            .await?
            .ok_or_else(|| ValidationError::not_found("Sale", sale_id))?;
        let items = sales.get_items(sale_id).await?;
        let payment = sales
            .get_payment(sale_id)
            .await?
            .ok_or_else(|| DbError::not_found("Payment", sale_id))?;
        let invoice = self
            .db
            .invoices()
            .get_by_sale_id(sale_id)
            .await?
            .ok_or_else(|| DbError::not_found("Invoice", sale_id))?;

        Ok(CompletedSale {
            sale,
            items,
            payment,
            invoice,
        })
    }

    // =========================================================================
    // Stages
    // =========================================================================

    async fn validate(&self, request: CreateSaleRequest) -> SaleResult<ValidatedCart> {
        validate_id("business_id", &request.business_id)?;
        validate_id("cashier_id", &request.cashier_id)?;
        validate_cart_size(request.lines.len(), self.policy.max_cart_lines)?;
        for line in &request.lines {
            validate_id("product_id", &line.product_id)?;
            validate_quantity(line.quantity)?;
        }

        let customer_email = non_blank(request.customer_email);
        if let Some(email) = &customer_email {
            validate_email(email)?;
        }
        let customer_phone = non_blank(request.customer_phone);
        if let Some(phone) = &customer_phone {
            validate_phone(phone)?;
        }

        let business = self
            .db
            .businesses()
            .get_by_id(&request.business_id)
            .await?
            .ok_or_else(|| ValidationError::not_found("Business", &request.business_id))?;

        let cashier = self
            .db
            .users()
            .get_by_id(&request.cashier_id)
            .await?
            .ok_or_else(|| ValidationError::not_found("User", &request.cashier_id))?;
        if cashier.business_id != business.id {
            return Err(ValidationError::ForeignOwnership {
                entity: "User".to_string(),
                id: cashier.id,
                business_id: business.id,
            }
            .into());
        }

        // Duplicate lines share one lookup.
        let products = self.db.products();
        let ledger = self.db.ledger();
        let mut known: HashMap<String, Product> = HashMap::new();
        let mut lines = Vec::with_capacity(request.lines.len());

        for line in request.lines {
            let product = match known.get(&line.product_id) {
                Some(product) => product.clone(),
                None => {
                    let product = products
                        .get_by_id(&line.product_id)
                        .await?
                        .ok_or_else(|| ValidationError::not_found("Product", &line.product_id))?;

                    if !product.belongs_to(&business.id) {
                        return Err(ValidationError::ForeignOwnership {
                            entity: "Product".to_string(),
                            id: product.id,
                            business_id: business.id,
                        }
                        .into());
                    }

                    if ledger.get(&product.id).await?.is_none() {
                        return Err(ValidationError::not_found("Stock", &product.id).into());
                    }

                    known.insert(product.id.clone(), product.clone());
                    product
                }
            };
            lines.push((line, product));
        }

        Ok(ValidatedCart {
            business,
            cashier,
            lines,
            customer_email,
            customer_phone,
            payment_method: request.payment_method,
        })
    }

    async fn price(&self, sale_id: &str, cart: &ValidatedCart) -> SaleResult<PricedCart> {
        let config = self
            .db
            .tax_configs()
            .find_by_business_id(&cart.business.id)
            .await?;
        let rate = resolve_tax_rate(config.as_ref(), &self.policy.tax);

        let mut items = Vec::with_capacity(cart.lines.len());
        let mut total_amount = Money::zero();
        let mut tax_amount = Money::zero();

        for (index, (line, product)) in cart.lines.iter().enumerate() {
            let computed = compute_line(product.unit_price, line.quantity, product.taxable, rate)?;

            total_amount = total_amount
                .checked_add(computed.tax_inclusive_total)
                .ok_or_else(|| overflow("sale total"))?;
            tax_amount = tax_amount
                .checked_add(computed.tax_amount)
                .ok_or_else(|| overflow("sale tax"))?;

            items.push(SaleItem {
                id: Uuid::new_v4().to_string(),
                sale_id: sale_id.to_string(),
                line_no: index as i64 + 1,
                product_id: product.id.clone(),
                quantity: line.quantity,
                unit_price: product.unit_price,
                tax_exclusive: computed.tax_exclusive,
                tax_amount: computed.tax_amount,
                line_total: computed.tax_inclusive_total,
            });
        }

        debug!(
            sale_id = %sale_id,
            rate = %rate.percentage(),
            total = %total_amount,
            tax = %tax_amount,
            "Sale priced"
        );

        Ok(PricedCart {
            items,
            total_amount,
            tax_amount,
        })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Ends the attempt in REJECTED or FAILED and logs why.
    fn abandon(&self, attempt: &mut SaleAttempt, sale_id: &str, err: SaleError) -> SaleError {
        let stage = attempt.stage();
        let moved = if err.is_client_error() {
            attempt.reject()
        } else {
            attempt.fail()
        };

        if err.is_client_error() {
            warn!(sale_id = %sale_id, ?stage, error = %err, "Sale rejected");
        } else {
            error!(sale_id = %sale_id, ?stage, error = ?err, "Sale failed");
        }

        if let Err(e) = moved {
            debug!(sale_id = %sale_id, error = %e, "Attempt left in its last stage");
        }
        err
    }

    /// Advances past commit. The sale is durable, so a stage error only logs.
    fn advance_committed(&self, attempt: &mut SaleAttempt, sale_id: &str, next: SaleStage) {
        if let Err(e) = attempt.advance(next) {
            error!(sale_id = %sale_id, error = %e, "Unexpected stage after commit");
        }
    }
}

/// Writes every row of a sale inside `conn`'s transaction.
async fn persist(
    conn: &mut SqliteConnection,
    sale: &Sale,
    items: &[SaleItem],
    payment: &Payment,
    invoice: &Invoice,
) -> DbResult<()> {
    SaleRepository::insert_sale(conn, sale).await?;
    SaleRepository::insert_items(conn, items).await?;
    SaleRepository::insert_payment(conn, payment).await?;
    InvoiceRepository::insert(conn, invoice).await?;
    ReceiptJobRepository::enqueue(conn, &sale.id).await?;
    Ok(())
}

async fn rollback(tx: sqlx::Transaction<'_, sqlx::Sqlite>, sale_id: &str) {
    if let Err(e) = tx.rollback().await {
        // The connection is dropped; SQLite discards the transaction anyway.
        warn!(sale_id = %sale_id, error = %e, "Explicit rollback failed");
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn overflow(context: &str) -> CoreError {
    CoreError::AmountOverflow {
        context: context.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_contacts_are_dropped() {
        assert_eq!(non_blank(Some("   ".into())), None);
        assert_eq!(non_blank(None), None);
        assert_eq!(
            non_blank(Some(" client@shop.sn ".into())).as_deref(),
            Some("client@shop.sn")
        );
    }

    #[test]
    fn test_default_policy() {
        let policy = SalePolicy::default();
        assert_eq!(policy.default_payment_method, PaymentMethod::Cash);
        assert_eq!(policy.max_cart_lines, MAX_CART_LINES);
    }
}
