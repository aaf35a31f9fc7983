//! # Tax Configuration Repository
//!
//! One optional row per business. Its absence is meaningful: the sale engine
//! then applies the default rate.

use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tracing::debug;

use super::decimal_column;
use crate::error::{DbError, DbResult};
use kassa_core::TaxConfiguration;

#[derive(Debug, sqlx::FromRow)]
struct TaxConfigRow {
    business_id: String,
    enabled: bool,
    rate: String,
}

impl TryFrom<TaxConfigRow> for TaxConfiguration {
    type Error = DbError;

    fn try_from(row: TaxConfigRow) -> DbResult<Self> {
        Ok(TaxConfiguration {
            rate: decimal_column("tax_configurations.rate", &row.rate)?,
            business_id: row.business_id,
            enabled: row.enabled,
        })
    }
}

/// Repository for per-business tax settings.
#[derive(Debug, Clone)]
pub struct TaxConfigRepository {
    pool: SqlitePool,
}

impl TaxConfigRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TaxConfigRepository { pool }
    }

    /// Finds the tax configuration of a business, if any.
    pub async fn find_by_business_id(&self, business_id: &str) -> DbResult<Option<TaxConfiguration>> {
        let row = sqlx::query_as::<_, TaxConfigRow>(
            "SELECT business_id, enabled, rate FROM tax_configurations WHERE business_id = ?1",
        )
        .bind(business_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TaxConfiguration::try_from).transpose()
    }

    /// Creates or replaces the configuration of a business.
    pub async fn upsert(&self, business_id: &str, enabled: bool, rate: Decimal) -> DbResult<()> {
        debug!(business_id = %business_id, enabled, rate = %rate, "Saving tax configuration");

        sqlx::query(
            r#"
            INSERT INTO tax_configurations (business_id, enabled, rate)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (business_id) DO UPDATE SET
                enabled = excluded.enabled,
                rate = excluded.rate
            "#,
        )
        .bind(business_id)
        .bind(enabled)
        .bind(rate.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
