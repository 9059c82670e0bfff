use std::sync::Arc;

use crate::panel::VpnPanel;
use crate::pricing::PricingTable;
use crate::services::payment::PaymentAdapter;
use crate::services::reconciler::PaymentReconciler;
use prism_db::repositories::payment_repo::PaymentRepository;
use prism_db::repositories::subscription_repo::SubscriptionRepository;
use prism_db::repositories::user_repo::UserRepository;

#[derive(Clone)]
pub struct AppState {
    pub users: UserRepository,
    pub payments: PaymentRepository,
    pub subs: SubscriptionRepository,
    pub pricing: Arc<PricingTable>,
    pub panel: Arc<dyn VpnPanel>,
    pub cryptobot: Option<Arc<dyn PaymentAdapter>>,
    pub reconciler: Arc<PaymentReconciler>,
    pub internal_api_token: Option<String>,
    pub admin_ids: Vec<i64>,
}
