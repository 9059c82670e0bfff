use teloxide::{dptree, prelude::*, types::Update};
use tracing::{error, info};

pub mod handlers;
pub mod keyboards;

pub async fn run_bot(bot: Bot, state: crate::state::AppState) {
    info!("Starting bot dispatcher...");

    match bot.get_me().await {
        Ok(me) => {
            info!(
                "Bot connected as @{}",
                me.username.clone().unwrap_or_else(|| "unknown".into())
            );
        }
        Err(e) => {
            error!("Bot failed to reach Telegram: {}", e);
            return;
        }
    }

    let message_handler = Update::filter_message().endpoint(handlers::message_handler);
    let callback_handler = Update::filter_callback_query().endpoint(handlers::callback_handler);
    let pre_checkout_handler =
        Update::filter_pre_checkout_query().endpoint(handlers::pre_checkout_handler);

    Dispatcher::builder(
        bot,
        dptree::entry()
            .branch(message_handler)
            .branch(callback_handler)
            .branch(pre_checkout_handler),
    )
    .dependencies(dptree::deps![state])
    .default_handler(|upd: std::sync::Arc<Update>| async move {
        tracing::debug!("Unhandled update: {:?}", upd);
    })
    .build()
    .dispatch()
    .await;
}
