use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::LedgerError;
use crate::models::store::User;

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the account on first contact; on later contacts only
    /// `last_seen_at` is refreshed, identity fields stay as first recorded.
    pub async fn upsert(&self, tg_id: i64, username: Option<&str>) -> Result<User, LedgerError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO users (tg_id, username, balance, created_at, last_seen_at)
             VALUES (?, ?, 0, ?, ?)
             ON CONFLICT(tg_id) DO UPDATE SET last_seen_at = excluded.last_seen_at",
        )
        .bind(tg_id)
        .bind(username)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(tg_id).await?.ok_or(LedgerError::AccountNotFound)
    }

    pub async fn get(&self, tg_id: i64) -> Result<Option<User>, LedgerError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE tg_id = ?")
            .bind(tg_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn balance(&self, tg_id: i64) -> Result<i64, LedgerError> {
        sqlx::query_scalar("SELECT balance FROM users WHERE tg_id = ?")
            .bind(tg_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(LedgerError::AccountNotFound)
    }

    pub async fn credit(&self, tg_id: i64, amount: i64) -> Result<(), LedgerError> {
        debug_assert!(amount >= 0);
        let res = sqlx::query("UPDATE users SET balance = balance + ? WHERE tg_id = ?")
            .bind(amount)
            .bind(tg_id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(LedgerError::AccountNotFound);
        }
        Ok(())
    }

    /// Atomic check-and-subtract: the balance guard lives in the UPDATE
    /// itself, so concurrent debits cannot overdraw.
    pub async fn debit(&self, tg_id: i64, amount: i64) -> Result<(), LedgerError> {
        debug_assert!(amount >= 0);
        let res = sqlx::query(
            "UPDATE users SET balance = balance - ? WHERE tg_id = ? AND balance >= ?",
        )
        .bind(amount)
        .bind(tg_id)
        .bind(amount)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            if self.get(tg_id).await?.is_none() {
                return Err(LedgerError::AccountNotFound);
            }
            return Err(LedgerError::InsufficientFunds);
        }
        Ok(())
    }

    /// Every known account id, for fan-out sends.
    pub async fn all_ids(&self) -> Result<Vec<i64>, LedgerError> {
        let ids = sqlx::query_scalar("SELECT tg_id FROM users ORDER BY tg_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    pub async fn count(&self) -> Result<i64, LedgerError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
