use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::prelude::*;
use tracing::warn;

/// Delivers final reconciliation outcomes to humans. The core calls it with
/// a settled state and moves on; delivery failures are logged, never
/// propagated back into the payment path.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn provisioned(&self, tg_id: i64, config_link: &str, expires_at: DateTime<Utc>);
    async fn provision_failed(&self, tg_id: i64);
    /// Money arrived but the purchase could not be resolved; alert the
    /// admins so the payment gets a pair of human eyes.
    async fn needs_review(&self, tg_id: i64, payment_key: &str);
}

pub struct TelegramNotifier {
    bot: Bot,
    admin_ids: Vec<i64>,
}

impl TelegramNotifier {
    pub fn new(bot: Bot, admin_ids: Vec<i64>) -> Self {
        Self { bot, admin_ids }
    }

    async fn send(&self, tg_id: i64, text: String) {
        if let Err(e) = self.bot.send_message(ChatId(tg_id), text).await {
            warn!("Failed to notify {}: {}", tg_id, e);
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn provisioned(&self, tg_id: i64, config_link: &str, expires_at: DateTime<Utc>) {
        let text = format!(
            "✅ VPN access is active!\n📅 Valid until: {}\n🔗 Connection link:\n{}\n\n📱 Android: v2rayNG\n🍏 iPhone: Streisand",
            expires_at.format("%d.%m.%Y"),
            config_link
        );
        self.send(tg_id, text).await;
    }

    async fn provision_failed(&self, tg_id: i64) {
        self.send(
            tg_id,
            "❌ Could not set up your VPN access. Your balance is intact — please try again or contact support.".to_string(),
        )
        .await;
    }

    async fn needs_review(&self, tg_id: i64, payment_key: &str) {
        for admin in &self.admin_ids {
            self.send(
                *admin,
                format!(
                    "⚠️ Payment {} from user {} completed with an unresolvable tariff — manual review needed.",
                    payment_key, tg_id
                ),
            )
            .await;
        }
    }
}
