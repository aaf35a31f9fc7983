//! # Inventory Ledger
//!
//! The only writer of `stocks`. Every quantity change appends a movement.
//!
//! ## Decrement Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  caller                                                                 │
//! │    guard = ledger.lock([p1, p2])         per-product locks, sorted     │
//! │    tx    = pool.begin()                                                 │
//! │    ledger.reserve_and_decrement(&mut tx, &guard, p1, 2, sale_id)       │
//! │       │                                                                 │
//! │       ├── UPDATE stocks SET quantity = quantity - 2                    │
//! │       │   WHERE product_id = p1 AND quantity >= 2   RETURNING quantity │
//! │       │        │                                                        │
//! │       │        ├── row    → INSERT stock_movements (SALE, -2, sale_id) │
//! │       │        └── no row → SELECT quantity → Insufficient / Missing   │
//! │       ▼                                                                 │
//! │    tx.commit()  or  drop(tx) = rollback of every decrement             │
//! │    drop(guard)                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! The conditional UPDATE never lets quantity go below zero, and the
//! `CHECK (quantity >= 0)` constraint backs it up.
//!
//! The UPDATE is the first statement of the transaction, so SQLite takes the
//! write lock up front and never has to upgrade a stale read snapshot.

use std::sync::Arc;

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DbError;
use crate::lock::{StockGuard, StockLocks};
use kassa_core::{MovementType, Stock, StockMovement};

// =============================================================================
// Errors
// =============================================================================

/// Refusals of the inventory ledger.
#[derive(Debug, Error)]
pub enum StockError {
    /// Not enough units on hand. Nothing was changed.
    ///
    /// `available` is read inside the caller's transaction, after any
    /// earlier decrements it made.
    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    Insufficient {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// The product has no stock row.
    #[error("No stock record for product {product_id}")]
    MissingStock { product_id: String },

    /// The caller's guard does not hold the product's lock.
    #[error("Stock of product {product_id} is not locked by the caller")]
    NotLocked { product_id: String },

    /// Quantities moved through the ledger must be positive.
    #[error("Invalid quantity {quantity}")]
    InvalidQuantity { quantity: i64 },

    /// The movement type does not match the direction of the change.
    #[error("{movement_type:?} cannot be used to {direction} stock")]
    InvalidMovement {
        movement_type: MovementType,
        direction: &'static str,
    },

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<sqlx::Error> for StockError {
    fn from(err: sqlx::Error) -> Self {
        StockError::Db(err.into())
    }
}

pub type StockResult<T> = Result<T, StockError>;

// =============================================================================
// Ledger
// =============================================================================

/// Stock quantities and their movement trail.
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    pool: SqlitePool,
    locks: Arc<StockLocks>,
}

impl InventoryLedger {
    pub fn new(pool: SqlitePool, locks: Arc<StockLocks>) -> Self {
        InventoryLedger { pool, locks }
    }

    /// Locks the stock rows of the given products until the guard drops.
    pub async fn lock<I, S>(&self, product_ids: I) -> StockGuard
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.locks.acquire(product_ids).await
    }

    /// Takes `quantity` units out for a sale, inside the caller's transaction.
    ///
    /// ## Errors
    /// * `NotLocked` - `guard` does not cover `product_id`
    /// * `Insufficient` - fewer than `quantity` units on hand
    /// * `MissingStock` - no stock row
    ///
    /// On error nothing was written by this call. Earlier writes of the same
    /// transaction are undone by rolling it back.
    pub async fn reserve_and_decrement(
        &self,
        conn: &mut SqliteConnection,
        guard: &StockGuard,
        product_id: &str,
        quantity: i64,
        sale_id: &str,
    ) -> StockResult<()> {
        if !guard.covers(product_id) {
            return Err(StockError::NotLocked {
                product_id: product_id.to_string(),
            });
        }

        let remaining =
            take_out(conn, product_id, quantity, MovementType::Sale, Some(sale_id)).await?;

        debug!(
            product_id = %product_id,
            quantity,
            remaining,
            sale_id = %sale_id,
            "Stock reserved for sale"
        );
        Ok(())
    }

    /// Adds units to a product (restocking, positive adjustment).
    ///
    /// Takes the product lock and commits its own transaction.
    /// Returns the new quantity.
    pub async fn increment(
        &self,
        product_id: &str,
        quantity: i64,
        movement_type: MovementType,
    ) -> StockResult<i64> {
        if !matches!(movement_type, MovementType::In | MovementType::Adjustment) {
            return Err(StockError::InvalidMovement {
                movement_type,
                direction: "increase",
            });
        }
        check_quantity(quantity)?;

        let _guard = self.lock([product_id]).await;
        let mut tx = self.pool.begin().await?;

        let new_quantity: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE stocks SET quantity = quantity + ?2, updated_at = ?3
            WHERE product_id = ?1
            RETURNING quantity
            "#,
        )
        .bind(product_id)
        .bind(quantity)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?;

        let new_quantity = new_quantity.ok_or_else(|| StockError::MissingStock {
            product_id: product_id.to_string(),
        })?;

        record_movement(&mut tx, product_id, quantity, movement_type, None).await?;
        tx.commit().await?;

        info!(product_id = %product_id, quantity, new_quantity, ?movement_type, "Stock increased");
        Ok(new_quantity)
    }

    /// Removes units outside a sale (loss, write-off, negative adjustment).
    ///
    /// Same non-negative guarantee as a sale. Returns the new quantity.
    pub async fn decrement(
        &self,
        product_id: &str,
        quantity: i64,
        movement_type: MovementType,
    ) -> StockResult<i64> {
        if !matches!(movement_type, MovementType::Out | MovementType::Adjustment) {
            return Err(StockError::InvalidMovement {
                movement_type,
                direction: "decrease",
            });
        }

        let _guard = self.lock([product_id]).await;
        let mut tx = self.pool.begin().await?;

        let remaining = take_out(&mut tx, product_id, quantity, movement_type, None).await?;
        tx.commit().await?;

        info!(product_id = %product_id, quantity, remaining, ?movement_type, "Stock decreased");
        Ok(remaining)
    }

    /// Creates the stock row of a product with an opening quantity.
    ///
    /// A positive opening quantity is logged as an IN movement.
    pub async fn open_stock(&self, product_id: &str, initial: i64) -> StockResult<Stock> {
        if initial < 0 {
            return Err(StockError::InvalidQuantity { quantity: initial });
        }

        let _guard = self.lock([product_id]).await;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO stocks (product_id, quantity, updated_at) VALUES (?1, ?2, ?3)")
            .bind(product_id)
            .bind(initial)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        if initial > 0 {
            record_movement(&mut tx, product_id, initial, MovementType::In, None).await?;
        }

        tx.commit().await?;

        debug!(product_id = %product_id, initial, "Stock opened");
        Ok(Stock {
            product_id: product_id.to_string(),
            quantity: initial,
            updated_at: now,
        })
    }

    /// Gets the stock row of a product.
    pub async fn get(&self, product_id: &str) -> StockResult<Option<Stock>> {
        let stock = sqlx::query_as::<_, Stock>(
            "SELECT product_id, quantity, updated_at FROM stocks WHERE product_id = ?1",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(stock)
    }

    /// Movements of a product, oldest first.
    pub async fn movements(&self, product_id: &str) -> StockResult<Vec<StockMovement>> {
        let movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, product_id, delta, movement_type, reference, created_at
            FROM stock_movements
            WHERE product_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    /// Movements carrying a reference (e.g. every SALE movement of a sale).
    pub async fn movements_by_reference(&self, reference: &str) -> StockResult<Vec<StockMovement>> {
        let movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, product_id, delta, movement_type, reference, created_at
            FROM stock_movements
            WHERE reference = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(reference)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }
}

// =============================================================================
// Statements
// =============================================================================

fn check_quantity(quantity: i64) -> StockResult<()> {
    if quantity <= 0 {
        return Err(StockError::InvalidQuantity { quantity });
    }
    Ok(())
}

/// Conditional decrement plus movement. Returns the remaining quantity.
async fn take_out(
    conn: &mut SqliteConnection,
    product_id: &str,
    quantity: i64,
    movement_type: MovementType,
    reference: Option<&str>,
) -> StockResult<i64> {
    check_quantity(quantity)?;

    let remaining: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE stocks SET quantity = quantity - ?2, updated_at = ?3
        WHERE product_id = ?1 AND quantity >= ?2
        RETURNING quantity
        "#,
    )
    .bind(product_id)
    .bind(quantity)
    .bind(Utc::now())
    .fetch_optional(&mut *conn)
    .await?;

    let Some(remaining) = remaining else {
        let available: Option<i64> =
            sqlx::query_scalar("SELECT quantity FROM stocks WHERE product_id = ?1")
                .bind(product_id)
                .fetch_optional(&mut *conn)
                .await?;

        return Err(match available {
            None => StockError::MissingStock {
                product_id: product_id.to_string(),
            },
            Some(available) => {
                warn!(
                    product_id = %product_id,
                    available,
                    requested = quantity,
                    "Insufficient stock"
                );
                StockError::Insufficient {
                    product_id: product_id.to_string(),
                    available,
                    requested: quantity,
                }
            }
        });
    };

    record_movement(conn, product_id, -quantity, movement_type, reference).await?;
    Ok(remaining)
}

async fn record_movement(
    conn: &mut SqliteConnection,
    product_id: &str,
    delta: i64,
    movement_type: MovementType,
    reference: Option<&str>,
) -> StockResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_movements (id, product_id, delta, movement_type, reference, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(product_id)
    .bind(delta)
    .bind(movement_type)
    .bind(reference)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
