use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct User {
    pub tg_id: i64,
    pub username: Option<String>,
    /// Balance in the settlement currency (whole rubles).
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Payment rail the money arrived on. Stored as the currency tag the rail
/// itself reports ("XTR" for Telegram Stars, "USDT" for CryptoBot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Instrument {
    Xtr,
    Usdt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Payment {
    pub id: i64,
    /// Idempotency key: the rail-specific charge or invoice id.
    pub payment_id: String,
    pub user_id: i64,
    /// Amount in the settlement currency.
    pub amount: i64,
    pub instrument: Instrument,
    pub tariff: Option<String>,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Revoked,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    /// Name the remote panel tracks this grant under. Unique across the panel.
    pub panel_name: String,
    /// Opaque connection credential handed back to the user.
    pub config_link: String,
    pub expires_at: DateTime<Utc>,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
}
