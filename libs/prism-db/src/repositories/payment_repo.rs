use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::LedgerError;
use crate::models::store::{Instrument, Payment, PaymentStatus};

#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a payment attempt under its idempotency key.
    ///
    /// Absent key: a pending row is created. Key held by a pending row
    /// (pre-created at invoice time): no-op, the stored amount and tariff
    /// stay authoritative. Key held by a completed row: `DuplicateKey`.
    pub async fn record(
        &self,
        key: &str,
        tg_id: i64,
        amount: i64,
        instrument: Instrument,
        tariff: Option<&str>,
    ) -> Result<(), LedgerError> {
        let res = sqlx::query(
            "INSERT INTO payments (payment_id, user_id, amount, instrument, tariff, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(payment_id) DO NOTHING",
        )
        .bind(key)
        .bind(tg_id)
        .bind(amount)
        .bind(instrument)
        .bind(tariff)
        .bind(PaymentStatus::Pending)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            if let Some(existing) = self.get(key).await? {
                if existing.status == PaymentStatus::Completed {
                    return Err(LedgerError::DuplicateKey);
                }
            }
        }
        Ok(())
    }

    /// Transition pending -> completed. The returned flag is the dedup gate:
    /// `false` means the key was absent or already completed, and the caller
    /// must not credit or provision for this event.
    pub async fn complete(&self, key: &str) -> Result<bool, LedgerError> {
        let res = sqlx::query(
            "UPDATE payments SET status = ?, completed_at = ? WHERE payment_id = ? AND status = ?",
        )
        .bind(PaymentStatus::Completed)
        .bind(Utc::now())
        .bind(key)
        .bind(PaymentStatus::Pending)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    pub async fn get(&self, key: &str) -> Result<Option<Payment>, LedgerError> {
        let payment =
            sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE payment_id = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(payment)
    }

    /// Sum of completed payments, settlement currency.
    pub async fn total_revenue(&self) -> Result<i64, LedgerError> {
        let total = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE status = ?",
        )
        .bind(PaymentStatus::Completed)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::user_repo::UserRepository;

    async fn repos() -> (UserRepository, PaymentRepository) {
        let pool = crate::connect("sqlite::memory:").await.unwrap();
        (
            UserRepository::new(pool.clone()),
            PaymentRepository::new(pool),
        )
    }

    #[tokio::test]
    async fn complete_transitions_exactly_once() {
        let (users, payments) = repos().await;
        users.upsert(1, None).await.unwrap();

        payments
            .record("charge-1", 1, 100, Instrument::Xtr, Some("month"))
            .await
            .unwrap();

        assert!(payments.complete("charge-1").await.unwrap());
        assert!(!payments.complete("charge-1").await.unwrap());

        let row = payments.get("charge-1").await.unwrap().unwrap();
        assert_eq!(row.status, PaymentStatus::Completed);
        assert!(row.completed_at.is_some());
    }

    #[tokio::test]
    async fn complete_absent_key_is_false() {
        let (_, payments) = repos().await;
        assert!(!payments.complete("never-seen").await.unwrap());
    }

    #[tokio::test]
    async fn record_is_noop_on_pending_and_fails_on_completed() {
        let (users, payments) = repos().await;
        users.upsert(1, None).await.unwrap();

        payments
            .record("inv-9", 1, 250, Instrument::Usdt, Some("quarter"))
            .await
            .unwrap();
        // Redelivery before completion keeps the invoice-time row.
        payments
            .record("inv-9", 1, 999, Instrument::Usdt, None)
            .await
            .unwrap();
        let row = payments.get("inv-9").await.unwrap().unwrap();
        assert_eq!(row.amount, 250);
        assert_eq!(row.tariff.as_deref(), Some("quarter"));

        assert!(payments.complete("inv-9").await.unwrap());
        let err = payments
            .record("inv-9", 1, 250, Instrument::Usdt, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateKey));
    }

    #[tokio::test]
    async fn revenue_counts_only_completed() {
        let (users, payments) = repos().await;
        users.upsert(1, None).await.unwrap();
        payments
            .record("a", 1, 100, Instrument::Xtr, None)
            .await
            .unwrap();
        payments
            .record("b", 1, 250, Instrument::Xtr, None)
            .await
            .unwrap();
        payments.complete("a").await.unwrap();

        assert_eq!(payments.total_revenue().await.unwrap(), 100);
    }
}
