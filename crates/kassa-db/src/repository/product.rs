//! # Product Repository
//!
//! Database operations for products.
//!
//! Prices are stored as decimal TEXT and decoded through [`ProductRow`],
//! so a corrupt price surfaces as `DbError::Decode` instead of a wrong sale.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use super::money_column;
use crate::error::{DbError, DbResult};
use kassa_core::{Money, Product};

const PRODUCT_COLUMNS: &str =
    "id, business_id, name, reference, unit_price, taxable, created_at, updated_at, deleted_at";

/// Raw `products` row.
#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    business_id: String,
    name: String,
    reference: String,
    unit_price: String,
    taxable: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<ProductRow> for Product {
    type Error = DbError;

    fn try_from(row: ProductRow) -> DbResult<Self> {
        Ok(Product {
            unit_price: money_column("products.unit_price", &row.unit_price)?,
            id: row.id,
            business_id: row.business_id,
            name: row.name,
            reference: row.reference,
            taxable: row.taxable,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
/// let product = repo.get_by_id("uuid-here").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a live product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found or soft-deleted
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1 AND deleted_at IS NULL"
        );

        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Product::try_from).transpose()
    }

    /// Lists the live products of a business, by name.
    pub async fn list_by_business(&self, business_id: &str) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE business_id = ?1 AND deleted_at IS NULL ORDER BY name"
        );

        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(business_id)
            .fetch_all(&self.pool)
            .await?;

        debug!(business_id = %business_id, count = rows.len(), "Listed products");
        rows.into_iter().map(Product::try_from).collect()
    }

    /// Inserts a new product.
    ///
    /// The stock row is created separately via `InventoryLedger::open_stock`.
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(product_id = %product.id, reference = %product.reference, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, business_id, name, reference, unit_price, taxable,
                created_at, updated_at, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&product.id)
        .bind(&product.business_id)
        .bind(&product.name)
        .bind(&product.reference)
        .bind(product.unit_price.to_string())
        .bind(product.taxable)
        .bind(product.created_at)
        .bind(product.updated_at)
        .bind(product.deleted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Changes the price of a product. Past sales keep their snapshot.
    pub async fn update_price(&self, id: &str, unit_price: Money) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE products SET unit_price = ?2, updated_at = ?3 \
             WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(unit_price.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Hides a product from lookups.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE products SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
