//! # Invoice Repository
//!
//! The invoice row is written inside the sale transaction. Everything after
//! that (receipt URL, delivery flags) is a post-commit update that never
//! touches the sale itself.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use kassa_core::{DeliveryChannel, Invoice};

const INVOICE_COLUMNS: &str = "id, sale_id, invoice_number, customer_email, customer_phone, \
     sent_by_email, sent_by_whatsapp, receipt_url, created_at";

/// Repository for invoice operations.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    /// Inserts the invoice of a sale, inside the caller's transaction.
    ///
    /// A duplicate invoice number surfaces as `DbError::UniqueViolation`.
    pub async fn insert(conn: &mut SqliteConnection, invoice: &Invoice) -> DbResult<()> {
        debug!(
            sale_id = %invoice.sale_id,
            invoice_number = %invoice.invoice_number,
            "Inserting invoice"
        );

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, sale_id, invoice_number, customer_email, customer_phone,
                sent_by_email, sent_by_whatsapp, receipt_url, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&invoice.id)
        .bind(&invoice.sale_id)
        .bind(&invoice.invoice_number)
        .bind(&invoice.customer_email)
        .bind(&invoice.customer_phone)
        .bind(invoice.sent_by_email)
        .bind(invoice.sent_by_whatsapp)
        .bind(&invoice.receipt_url)
        .bind(invoice.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Invoice>> {
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?1");

        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(invoice)
    }

    pub async fn get_by_sale_id(&self, sale_id: &str) -> DbResult<Option<Invoice>> {
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE sale_id = ?1");

        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(invoice)
    }

    /// Sets the receipt URL unless one is already set.
    ///
    /// ## Returns
    /// `true` if this call attached the URL, `false` if the invoice already
    /// had one (the existing URL is kept).
    pub async fn attach_receipt_url(&self, invoice_id: &str, url: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE invoices SET receipt_url = ?2 WHERE id = ?1 AND receipt_url IS NULL",
        )
        .bind(invoice_id)
        .bind(url)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            debug!(invoice_id = %invoice_id, url = %url, "Receipt attached");
            return Ok(true);
        }

        // Distinguish "already attached" from "no such invoice".
        match self.get_by_id(invoice_id).await? {
            Some(_) => Ok(false),
            None => Err(DbError::not_found("Invoice", invoice_id)),
        }
    }

    /// Records that the invoice was delivered over `channel`.
    pub async fn mark_delivered(&self, invoice_id: &str, channel: DeliveryChannel) -> DbResult<()> {
        let sql = match channel {
            DeliveryChannel::Email => "UPDATE invoices SET sent_by_email = 1 WHERE id = ?1",
            DeliveryChannel::WhatsApp => "UPDATE invoices SET sent_by_whatsapp = 1 WHERE id = ?1",
        };

        let result = sqlx::query(sql).bind(invoice_id).execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Invoice", invoice_id));
        }

        debug!(invoice_id = %invoice_id, ?channel, "Invoice marked delivered");
        Ok(())
    }
}
