use std::sync::Arc;
use tracing::{error, info, warn};

use crate::payload::PaymentPayload;
use crate::pricing::PricingTable;
use crate::services::notifier::Notifier;
use crate::services::provisioner::SubscriptionProvisioner;
use prism_db::error::LedgerError;
use prism_db::models::store::{Instrument, Subscription};
use prism_db::repositories::payment_repo::PaymentRepository;
use prism_db::repositories::user_repo::UserRepository;
use prism_db::sqlx;

/// A payment confirmation normalized across rails. The Stars handler and the
/// CryptoBot webhook both produce this; nothing rail-specific reaches the
/// core.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    /// Rail-specific idempotency key: charge id for Stars, invoice id for
    /// CryptoBot.
    pub idempotency_key: String,
    pub tg_id: i64,
    pub username: Option<String>,
    pub instrument: Instrument,
    /// Amount paid, in the instrument's own unit.
    pub amount: f64,
    pub payload: Option<PaymentPayload>,
}

#[derive(Debug)]
pub enum ReconcileOutcome {
    Provisioned(Subscription),
    /// The key was already processed; nothing changed.
    Duplicate,
    /// Money arrived but its purpose could not be established. The payment
    /// stays completed (blocking replays), nothing is credited, and the
    /// event is flagged for manual review. A tariff is never guessed.
    UnresolvedTariff,
    /// Credited, but the remote grant failed; the balance already reflects
    /// the provisioner's compensation.
    ProvisionFailed,
}

pub struct PaymentReconciler {
    users: UserRepository,
    payments: PaymentRepository,
    pricing: Arc<PricingTable>,
    provisioner: SubscriptionProvisioner,
    notifier: Arc<dyn Notifier>,
}

impl PaymentReconciler {
    pub fn new(
        users: UserRepository,
        payments: PaymentRepository,
        pricing: Arc<PricingTable>,
        provisioner: SubscriptionProvisioner,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            users,
            payments,
            pricing,
            provisioner,
            notifier,
        }
    }

    /// Run one confirmation through dedup, credit and provisioning. Ledger
    /// failures abort the attempt and propagate; the sender may retry, the
    /// dedup gate makes the retry safe.
    pub async fn process(&self, event: PaymentEvent) -> Result<ReconcileOutcome, LedgerError> {
        self.users
            .upsert(event.tg_id, event.username.as_deref())
            .await?;

        let settlement = self.pricing.to_settlement(event.instrument, event.amount);
        let payload_tariff = event.payload.as_ref().map(|p| p.tariff.clone());

        match self
            .payments
            .record(
                &event.idempotency_key,
                event.tg_id,
                settlement,
                event.instrument,
                payload_tariff.as_deref(),
            )
            .await
        {
            Ok(()) => {}
            Err(LedgerError::DuplicateKey) => {
                info!("Ignoring replay of payment {}", event.idempotency_key);
                return Ok(ReconcileOutcome::Duplicate);
            }
            Err(e) => return Err(e),
        }

        // Sole dedup gate: only the call that flips pending -> completed may
        // credit and provision.
        if !self.payments.complete(&event.idempotency_key).await? {
            info!("Ignoring replay of payment {}", event.idempotency_key);
            return Ok(ReconcileOutcome::Duplicate);
        }

        // The stored row is authoritative: for invoice-based rails it carries
        // the amount and tariff the user agreed to at invoice time.
        let recorded = self
            .payments
            .get(&event.idempotency_key)
            .await?
            .ok_or(LedgerError::Db(sqlx::Error::RowNotFound))?;

        let tariff_key = payload_tariff.or_else(|| recorded.tariff.clone());
        let Some(tariff_key) = tariff_key else {
            error!(
                "Payment {} from {} carries no tariff; flagged for manual review",
                event.idempotency_key, event.tg_id
            );
            self.notifier
                .needs_review(event.tg_id, &event.idempotency_key)
                .await;
            return Ok(ReconcileOutcome::UnresolvedTariff);
        };
        let tariff = match self.pricing.get(&tariff_key) {
            Ok(t) => t.clone(),
            Err(e) => {
                error!(
                    "Payment {} from {}: {}; flagged for manual review",
                    event.idempotency_key, event.tg_id, e
                );
                self.notifier
                    .needs_review(event.tg_id, &event.idempotency_key)
                    .await;
                return Ok(ReconcileOutcome::UnresolvedTariff);
            }
        };

        // Some rails do not echo the paid amount back; the invoice row may
        // then hold zero and the tariff price is the agreed settlement value.
        let credit = if recorded.amount > 0 {
            recorded.amount
        } else {
            tariff.price
        };
        self.users.credit(event.tg_id, credit).await?;

        match self.provisioner.provision(event.tg_id, &tariff).await {
            Ok(sub) => {
                info!(
                    "Payment {} settled: {} credited, {} provisioned until {}",
                    event.idempotency_key, credit, sub.panel_name, sub.expires_at
                );
                self.notifier
                    .provisioned(event.tg_id, &sub.config_link, sub.expires_at)
                    .await;
                Ok(ReconcileOutcome::Provisioned(sub))
            }
            Err(e) => {
                warn!(
                    "Provisioning after payment {} failed: {}",
                    event.idempotency_key, e
                );
                self.notifier.provision_failed(event.tg_id).await;
                Ok(ReconcileOutcome::ProvisionFailed)
            }
        }
    }
}
