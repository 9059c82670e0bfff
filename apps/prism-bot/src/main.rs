use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;
use teloxide::prelude::*;
use tower_http::trace::TraceLayer;
use tracing::info;

mod bot;
mod config;
mod handlers;
mod panel;
mod payload;
mod pricing;
mod services;
mod state;

use crate::config::Config;
use crate::panel::VpnPanel;
use crate::panel::marzban::MarzbanClient;
use crate::pricing::PricingTable;
use crate::services::notifier::TelegramNotifier;
use crate::services::payment::PaymentAdapter;
use crate::services::payment::cryptobot::CryptoBotAdapter;
use crate::services::provisioner::SubscriptionProvisioner;
use crate::services::reconciler::PaymentReconciler;
use crate::state::AppState;
use prism_db::repositories::payment_repo::PaymentRepository;
use prism_db::repositories::subscription_repo::SubscriptionRepository;
use prism_db::repositories::user_repo::UserRepository;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!("Starting Prism VPN bot...");

    let config = Config::from_env()?;
    let pool = prism_db::db::init_db().await?;
    info!("Database ready");

    let users = UserRepository::new(pool.clone());
    let payments = PaymentRepository::new(pool.clone());
    let subs = SubscriptionRepository::new(pool.clone());
    let pricing = Arc::new(PricingTable::standard(
        config.star_price_rub,
        config.usdt_price_rub,
    ));

    let panel: Arc<dyn VpnPanel> = Arc::new(MarzbanClient::new(
        config.marzban_url.clone(),
        config.marzban_user.clone(),
        config.marzban_pass.clone(),
    )?);

    let bot = Bot::new(&config.bot_token);
    let notifier = Arc::new(TelegramNotifier::new(bot.clone(), config.admin_ids.clone()));

    let provisioner = SubscriptionProvisioner::new(users.clone(), subs.clone(), panel.clone());
    let reconciler = Arc::new(PaymentReconciler::new(
        users.clone(),
        payments.clone(),
        pricing.clone(),
        provisioner,
        notifier,
    ));

    let cryptobot: Option<Arc<dyn PaymentAdapter>> = match config.cryptobot_token.clone() {
        Some(token) => Some(Arc::new(CryptoBotAdapter::new(token)?)),
        None => None,
    };

    let state = AppState {
        users,
        payments,
        subs,
        pricing,
        panel,
        cryptobot,
        reconciler,
        internal_api_token: config.internal_api_token.clone(),
        admin_ids: config.admin_ids.clone(),
    };

    let app = handlers::webhook::routes(state.clone()).layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Webhook server listening on {}", config.bind_addr);

    tokio::select! {
        res = axum::serve(listener, app) => {
            res.context("Webhook server exited")?;
        }
        _ = bot::run_bot(bot, state) => {
            info!("Bot dispatcher exited");
        }
    }

    Ok(())
}
