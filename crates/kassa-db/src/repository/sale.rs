//! # Sale Repository
//!
//! Sales, their items and their payment.
//!
//! Writes are associated functions taking `&mut SqliteConnection`: they are
//! only ever called inside the sale transaction opened by the orchestrator,
//! next to the stock decrements. Reads go through the pool and therefore only
//! ever see committed sales.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::money_column;
use crate::error::{DbError, DbResult};
use kassa_core::{Payment, PaymentMethod, Sale, SaleItem};

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    id: String,
    business_id: String,
    cashier_id: String,
    total_amount: String,
    tax_amount: String,
    sold_at: DateTime<Utc>,
}

impl TryFrom<SaleRow> for Sale {
    type Error = DbError;

    fn try_from(row: SaleRow) -> DbResult<Self> {
        Ok(Sale {
            total_amount: money_column("sales.total_amount", &row.total_amount)?,
            tax_amount: money_column("sales.tax_amount", &row.tax_amount)?,
            id: row.id,
            business_id: row.business_id,
            cashier_id: row.cashier_id,
            sold_at: row.sold_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SaleItemRow {
    id: String,
    sale_id: String,
    line_no: i64,
    product_id: String,
    quantity: i64,
    unit_price: String,
    tax_exclusive: String,
    tax_amount: String,
    line_total: String,
}

impl TryFrom<SaleItemRow> for SaleItem {
    type Error = DbError;

    fn try_from(row: SaleItemRow) -> DbResult<Self> {
        Ok(SaleItem {
            unit_price: money_column("sale_items.unit_price", &row.unit_price)?,
            tax_exclusive: money_column("sale_items.tax_exclusive", &row.tax_exclusive)?,
            tax_amount: money_column("sale_items.tax_amount", &row.tax_amount)?,
            line_total: money_column("sale_items.line_total", &row.line_total)?,
            id: row.id,
            sale_id: row.sale_id,
            line_no: row.line_no,
            product_id: row.product_id,
            quantity: row.quantity,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: String,
    sale_id: String,
    amount: String,
    method: PaymentMethod,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DbError;

    fn try_from(row: PaymentRow) -> DbResult<Self> {
        Ok(Payment {
            amount: money_column("payments.amount", &row.amount)?,
            id: row.id,
            sale_id: row.sale_id,
            method: row.method,
            created_at: row.created_at,
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for sale operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Transactional writes
    // -------------------------------------------------------------------------

    /// Inserts the sale header.
    pub async fn insert_sale(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
        debug!(sale_id = %sale.id, total = %sale.total_amount, "Inserting sale");

        sqlx::query(
            r#"
            INSERT INTO sales (id, business_id, cashier_id, total_amount, tax_amount, sold_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.business_id)
        .bind(&sale.cashier_id)
        .bind(sale.total_amount.to_string())
        .bind(sale.tax_amount.to_string())
        .bind(sale.sold_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Inserts the items of a sale, in order.
    pub async fn insert_items(conn: &mut SqliteConnection, items: &[SaleItem]) -> DbResult<()> {
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO sale_items (
                    id, sale_id, line_no, product_id, quantity,
                    unit_price, tax_exclusive, tax_amount, line_total
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&item.id)
            .bind(&item.sale_id)
            .bind(item.line_no)
            .bind(&item.product_id)
            .bind(item.quantity)
            .bind(item.unit_price.to_string())
            .bind(item.tax_exclusive.to_string())
            .bind(item.tax_amount.to_string())
            .bind(item.line_total.to_string())
            .execute(&mut *conn)
            .await?;
        }

        debug!(count = items.len(), "Inserted sale items");
        Ok(())
    }

    /// Inserts the payment of a sale. One per sale (UNIQUE sale_id).
    pub async fn insert_payment(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
        debug!(
            sale_id = %payment.sale_id,
            method = %payment.method,
            amount = %payment.amount,
            "Inserting payment"
        );

        sqlx::query(
            r#"
            INSERT INTO payments (id, sale_id, amount, method, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.sale_id)
        .bind(payment.amount.to_string())
        .bind(payment.method)
        .bind(payment.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Gets a committed sale by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let row = sqlx::query_as::<_, SaleRow>(
            r#"
            SELECT id, business_id, cashier_id, total_amount, tax_amount, sold_at
            FROM sales
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Sale::try_from).transpose()
    }

    /// Gets the items of a sale, in cart order.
    pub async fn get_items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let rows = sqlx::query_as::<_, SaleItemRow>(
            r#"
            SELECT id, sale_id, line_no, product_id, quantity,
                   unit_price, tax_exclusive, tax_amount, line_total
            FROM sale_items
            WHERE sale_id = ?1
            ORDER BY line_no
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SaleItem::try_from).collect()
    }

    /// Gets the payment of a sale.
    pub async fn get_payment(&self, sale_id: &str) -> DbResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            "SELECT id, sale_id, amount, method, created_at FROM payments WHERE sale_id = ?1",
        )
        .bind(sale_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Payment::try_from).transpose()
    }

    /// Counts the committed sales of a business.
    pub async fn count_for_business(&self, business_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales WHERE business_id = ?1")
            .bind(business_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Generates a new sale item ID.
pub fn generate_sale_item_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Generates a new payment ID.
pub fn generate_payment_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::*;
    use kassa_core::Money;
    use uuid::Uuid;

    fn m(s: &str) -> Money {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_committed_sale_is_readable() {
        let db = memory_db().await;
        let business = business(&db).await;
        let cashier = cashier(&db, &business.id).await;
        let product = product(&db, &business.id, "1180", true).await;

        let sale = Sale {
            id: Uuid::new_v4().to_string(),
            business_id: business.id.clone(),
            cashier_id: cashier.id.clone(),
            total_amount: m("2360"),
            tax_amount: m("360"),
            sold_at: Utc::now(),
        };
        let item = SaleItem {
            id: generate_sale_item_id(),
            sale_id: sale.id.clone(),
            line_no: 1,
            product_id: product.id.clone(),
            quantity: 2,
            unit_price: m("1180"),
            tax_exclusive: m("2000.0000"),
            tax_amount: m("360.0000"),
            line_total: m("2360"),
        };
        let payment = Payment {
            id: generate_payment_id(),
            sale_id: sale.id.clone(),
            amount: m("2360"),
            method: PaymentMethod::MobileMoney,
            created_at: Utc::now(),
        };

        let mut tx = db.pool().begin().await.unwrap();
        SaleRepository::insert_sale(&mut tx, &sale).await.unwrap();
        SaleRepository::insert_items(&mut tx, std::slice::from_ref(&item))
            .await
            .unwrap();
        SaleRepository::insert_payment(&mut tx, &payment).await.unwrap();
        tx.commit().await.unwrap();

        let repo = db.sales();
        let found = repo.get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(found.total_amount, m("2360"));
        assert_eq!(found.tax_amount, m("360"));

        let items = repo.get_items(&sale.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].tax_exclusive, m("2000"));

        let found_payment = repo.get_payment(&sale.id).await.unwrap().unwrap();
        assert_eq!(found_payment.method, PaymentMethod::MobileMoney);
        assert_eq!(repo.count_for_business(&business.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_second_payment_is_a_unique_violation() {
        let db = memory_db().await;
        let business = business(&db).await;
        let cashier = cashier(&db, &business.id).await;

        let sale = Sale {
            id: Uuid::new_v4().to_string(),
            business_id: business.id,
            cashier_id: cashier.id,
            total_amount: m("10"),
            tax_amount: Money::zero(),
            sold_at: Utc::now(),
        };
        let payment = |id: String| Payment {
            id,
            sale_id: sale.id.clone(),
            amount: m("10"),
            method: PaymentMethod::Cash,
            created_at: Utc::now(),
        };

        let mut tx = db.pool().begin().await.unwrap();
        SaleRepository::insert_sale(&mut tx, &sale).await.unwrap();
        SaleRepository::insert_payment(&mut tx, &payment(generate_payment_id()))
            .await
            .unwrap();
        let err = SaleRepository::insert_payment(&mut tx, &payment(generate_payment_id()))
            .await
            .unwrap_err();

        assert!(err.is_unique_violation());
    }
}
