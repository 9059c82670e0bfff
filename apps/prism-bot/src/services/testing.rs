use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::panel::{PanelError, VpnPanel, bump_expiry};
use crate::pricing::PricingTable;
use crate::services::notifier::Notifier;
use crate::services::provisioner::SubscriptionProvisioner;
use crate::services::reconciler::PaymentReconciler;
use prism_db::repositories::payment_repo::PaymentRepository;
use prism_db::repositories::subscription_repo::SubscriptionRepository;
use prism_db::repositories::user_repo::UserRepository;

/// In-memory panel double: tracks remote expiries and records every call.
pub struct MockPanel {
    pub accounts: Mutex<HashMap<String, DateTime<Utc>>>,
    calls: Mutex<Vec<String>>,
    pub fail_create: AtomicBool,
    pub fail_extend: AtomicBool,
}

impl MockPanel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            accounts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            fail_create: AtomicBool::new(false),
            fail_extend: AtomicBool::new(false),
        })
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl VpnPanel for MockPanel {
    async fn create_account(
        &self,
        name: &str,
        duration_days: i64,
        _traffic_limit_bytes: u64,
    ) -> Result<String, PanelError> {
        self.calls.lock().await.push(format!("create:{}", name));
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(PanelError::ProvisionFailed("remote 500".to_string()));
        }
        let expires_at = Utc::now() + Duration::days(duration_days);
        self.accounts
            .lock()
            .await
            .insert(name.to_string(), expires_at);
        Ok(format!("vless://{}", name))
    }

    async fn extend_account(
        &self,
        name: &str,
        duration_days: i64,
    ) -> Result<DateTime<Utc>, PanelError> {
        self.calls.lock().await.push(format!("extend:{}", name));
        if self.fail_extend.load(Ordering::SeqCst) {
            return Err(PanelError::ProvisionFailed("remote 500".to_string()));
        }
        let now = Utc::now();
        let mut accounts = self.accounts.lock().await;
        let new_expiry = bump_expiry(accounts.get(name).copied(), now, duration_days);
        accounts.insert(name.to_string(), new_expiry);
        Ok(new_expiry)
    }

    async fn account_expiry(&self, name: &str) -> Result<Option<DateTime<Utc>>, PanelError> {
        Ok(self.accounts.lock().await.get(name).copied())
    }

    async fn delete_account(&self, name: &str) -> Result<(), PanelError> {
        self.calls.lock().await.push(format!("delete:{}", name));
        self.accounts.lock().await.remove(name);
        Ok(())
    }
}

/// Notifier double that only records which payments were flagged for review.
pub struct RecordingNotifier {
    pub reviews: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn provisioned(&self, _tg_id: i64, _config_link: &str, _expires_at: DateTime<Utc>) {}

    async fn provision_failed(&self, _tg_id: i64) {}

    async fn needs_review(&self, _tg_id: i64, payment_key: &str) {
        self.reviews.lock().await.push(payment_key.to_string());
    }
}

pub struct Stack {
    pub users: UserRepository,
    pub payments: PaymentRepository,
    pub subs: SubscriptionRepository,
    pub pricing: Arc<PricingTable>,
    pub panel: Arc<MockPanel>,
    pub provisioner: SubscriptionProvisioner,
    pub reconciler: PaymentReconciler,
    pub reviews: Arc<Mutex<Vec<String>>>,
}

/// Full reconciliation stack over an in-memory ledger. Test rates keep the
/// numbers whole: 1 star = 2 rubles, 1 USDT = 100 rubles.
pub async fn stack() -> Stack {
    let pool = prism_db::connect("sqlite::memory:").await.unwrap();
    let users = UserRepository::new(pool.clone());
    let payments = PaymentRepository::new(pool.clone());
    let subs = SubscriptionRepository::new(pool.clone());
    let pricing = Arc::new(PricingTable::standard(2.0, 100.0));
    let panel = MockPanel::new();
    let reviews = Arc::new(Mutex::new(Vec::new()));

    let provisioner = SubscriptionProvisioner::new(
        users.clone(),
        subs.clone(),
        panel.clone() as Arc<dyn VpnPanel>,
    );
    let reconciler = PaymentReconciler::new(
        users.clone(),
        payments.clone(),
        pricing.clone(),
        provisioner.clone(),
        Arc::new(RecordingNotifier {
            reviews: reviews.clone(),
        }),
    );

    Stack {
        users,
        payments,
        subs,
        pricing,
        panel,
        provisioner,
        reconciler,
        reviews,
    }
}
