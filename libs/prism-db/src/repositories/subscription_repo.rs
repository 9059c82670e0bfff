use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::LedgerError;
use crate::models::store::{Subscription, SubscriptionStatus};

#[derive(Debug, Clone)]
pub struct SubscriptionRepository {
    pool: SqlitePool,
}

impl SubscriptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The renewable subscription for an account: the most recent row that is
    /// both active and unexpired at `now`. `now` is bound from Rust so the
    /// comparison stays within one timestamp encoding.
    pub async fn get_active_by_user(
        &self,
        tg_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>, LedgerError> {
        let sub = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions
             WHERE user_id = ? AND status = ? AND expires_at > ?
             ORDER BY expires_at DESC LIMIT 1",
        )
        .bind(tg_id)
        .bind(SubscriptionStatus::Active)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(sub)
    }

    pub async fn get_by_panel_name(
        &self,
        panel_name: &str,
    ) -> Result<Option<Subscription>, LedgerError> {
        let sub = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE panel_name = ?",
        )
        .bind(panel_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(sub)
    }

    /// Insert or refresh the row keyed by the unique panel name.
    pub async fn upsert(
        &self,
        tg_id: i64,
        panel_name: &str,
        config_link: &str,
        expires_at: DateTime<Utc>,
        status: SubscriptionStatus,
    ) -> Result<Subscription, LedgerError> {
        sqlx::query(
            "INSERT INTO subscriptions (user_id, panel_name, config_link, expires_at, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(panel_name) DO UPDATE SET
                 config_link = excluded.config_link,
                 expires_at = excluded.expires_at,
                 status = excluded.status",
        )
        .bind(tg_id)
        .bind(panel_name)
        .bind(config_link)
        .bind(expires_at)
        .bind(status)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get_by_panel_name(panel_name)
            .await?
            .ok_or(LedgerError::AccountNotFound)
    }

    pub async fn update_status(
        &self,
        panel_name: &str,
        status: SubscriptionStatus,
    ) -> Result<bool, LedgerError> {
        let res = sqlx::query("UPDATE subscriptions SET status = ? WHERE panel_name = ?")
            .bind(status)
            .bind(panel_name)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn count_active(&self, now: DateTime<Utc>) -> Result<i64, LedgerError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM subscriptions WHERE status = ? AND expires_at > ?",
        )
        .bind(SubscriptionStatus::Active)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn count_total(&self) -> Result<i64, LedgerError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
