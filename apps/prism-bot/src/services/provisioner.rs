use chrono::{Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::panel::{PanelError, VpnPanel};
use crate::pricing::Tariff;
use prism_db::error::LedgerError;
use prism_db::models::store::{Subscription, SubscriptionStatus};
use prism_db::repositories::subscription_repo::SubscriptionRepository;
use prism_db::repositories::user_repo::UserRepository;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Panel(#[from] PanelError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Turns a paid-for tariff into a remote account grant. This is the only
/// place balance is spent against a provisioning attempt: the boundary
/// between "money received" and "service granted".
#[derive(Clone)]
pub struct SubscriptionProvisioner {
    users: UserRepository,
    subs: SubscriptionRepository,
    panel: Arc<dyn VpnPanel>,
}

impl SubscriptionProvisioner {
    pub fn new(
        users: UserRepository,
        subs: SubscriptionRepository,
        panel: Arc<dyn VpnPanel>,
    ) -> Self {
        Self { users, subs, panel }
    }

    /// Debit the tariff price, then create-or-extend on the remote panel.
    /// Every failure after the debit credits the same amount back before
    /// surfacing, so the user is never left debited without a subscription
    /// change.
    pub async fn provision(
        &self,
        tg_id: i64,
        tariff: &Tariff,
    ) -> Result<Subscription, ProvisionError> {
        self.users.debit(tg_id, tariff.price).await?;

        match self.create_or_extend(tg_id, tariff).await {
            Ok(sub) => Ok(sub),
            Err(e) => {
                error!(
                    "Provisioning for {} failed, compensating {} back: {}",
                    tg_id, tariff.price, e
                );
                if let Err(refund_err) = self.users.credit(tg_id, tariff.price).await {
                    // The account exists, we debited it a moment ago; if this
                    // fires the store itself is down and the operator has to
                    // reconcile from the payments table.
                    error!("Compensating credit for {} failed: {}", tg_id, refund_err);
                }
                Err(e)
            }
        }
    }

    async fn create_or_extend(
        &self,
        tg_id: i64,
        tariff: &Tariff,
    ) -> Result<Subscription, ProvisionError> {
        let now = Utc::now();

        if let Some(sub) = self.subs.get_active_by_user(tg_id, now).await? {
            let new_expiry = self.panel.extend_account(&sub.panel_name, tariff.days).await?;
            let updated = self
                .subs
                .upsert(
                    tg_id,
                    &sub.panel_name,
                    &sub.config_link,
                    new_expiry,
                    SubscriptionStatus::Active,
                )
                .await?;
            info!("Extended {} until {}", sub.panel_name, new_expiry);
            return Ok(updated);
        }

        // Panel names are never reused: the timestamp keeps a second purchase
        // distinct even after an earlier account lapsed or was revoked.
        let panel_name = format!("user_{}_{}", tg_id, now.timestamp());
        let config_link = self.panel.create_account(&panel_name, tariff.days, 0).await?;
        let expires_at = now + Duration::days(tariff.days);
        let sub = self
            .subs
            .upsert(
                tg_id,
                &panel_name,
                &config_link,
                expires_at,
                SubscriptionStatus::Active,
            )
            .await?;
        info!("Created {} until {}", panel_name, expires_at);
        Ok(sub)
    }
}
