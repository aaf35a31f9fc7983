//! # Business & User Repositories
//!
//! Lookups used to validate who is selling for whom.
//! Soft-deleted rows are invisible: `deleted_at IS NULL` on every read.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use kassa_core::{Business, User};

/// Repository for business lookups.
#[derive(Debug, Clone)]
pub struct BusinessRepository {
    pool: SqlitePool,
}

impl BusinessRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BusinessRepository { pool }
    }

    /// Gets a live business by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Business>> {
        let business = sqlx::query_as::<_, Business>(
            r#"
            SELECT id, name, created_at, deleted_at
            FROM businesses
            WHERE id = ?1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(business)
    }

    pub async fn insert(&self, business: &Business) -> DbResult<()> {
        debug!(business_id = %business.id, "Inserting business");

        sqlx::query(
            r#"
            INSERT INTO businesses (id, name, created_at, deleted_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&business.id)
        .bind(&business.name)
        .bind(business.created_at)
        .bind(business.deleted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Hides a business from lookups.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE businesses SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Business", id));
        }

        Ok(())
    }
}

/// Repository for user (cashier) lookups.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Gets a live user by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, business_id, name, email, created_at, deleted_at
            FROM users
            WHERE id = ?1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn insert(&self, user: &User) -> DbResult<()> {
        debug!(user_id = %user.id, business_id = %user.business_id, "Inserting user");

        sqlx::query(
            r#"
            INSERT INTO users (id, business_id, name, email, created_at, deleted_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&user.id)
        .bind(&user.business_id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.created_at)
        .bind(user.deleted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Hides a user from lookups.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE users SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL")
                .bind(id)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", id));
        }

        Ok(())
    }
}
