use teloxide::prelude::*;
use teloxide::types::{
    LabeledPrice, Message, PreCheckoutQuery, SuccessfulPayment, TelegramTransactionId,
};
use tracing::{error, warn};

use super::keyboards;
use crate::payload::PaymentPayload;
use crate::services::reconciler::PaymentEvent;
use crate::state::AppState;
use prism_db::models::store::Instrument;

const WELCOME: &str = "👋 Welcome to Prism VPN!\n\n🚀 Fast and stable VPN over VLESS\n🌍 Servers in the Netherlands\n📱 Works on every device\n\n👇 Pick a plan below";

pub async fn message_handler(bot: Bot, msg: Message, state: AppState) -> ResponseResult<()> {
    if let Some(payment) = msg.successful_payment() {
        return successful_payment_handler(bot, &msg, payment, state).await;
    }

    let Some(text) = msg.text() else {
        return Ok(());
    };

    if text.starts_with("/broadcast") {
        return broadcast_handler(bot, &msg, &state, text).await;
    }

    if text.starts_with("/start") {
        if let Some(user) = msg.from.as_ref() {
            if let Err(e) = state
                .users
                .upsert(user.id.0 as i64, user.username.as_deref())
                .await
            {
                error!("Account upsert on /start failed: {}", e);
            }
        }
        bot.send_message(msg.chat.id, WELCOME)
            .reply_markup(keyboards::main_menu())
            .await?;
    }

    Ok(())
}

/// Admin fan-out to every known account. Individual send failures are
/// skipped; the admin gets the delivered count back. Never part of the
/// payment path, no ledger writes.
async fn broadcast_handler(
    bot: Bot,
    msg: &Message,
    state: &AppState,
    text: &str,
) -> ResponseResult<()> {
    let Some(sender) = msg.from.as_ref().map(|u| u.id.0 as i64) else {
        return Ok(());
    };
    if !state.admin_ids.contains(&sender) {
        return Ok(());
    }

    let Some(body) = broadcast_text(text) else {
        bot.send_message(msg.chat.id, "❌ Usage: /broadcast <text>")
            .await?;
        return Ok(());
    };

    let ids = match state.users.all_ids().await {
        Ok(ids) => ids,
        Err(e) => {
            error!("Account listing for broadcast failed: {}", e);
            bot.send_message(msg.chat.id, "❌ Broadcast failed.").await?;
            return Ok(());
        }
    };

    let mut sent = 0usize;
    for id in ids {
        match bot.send_message(ChatId(id), body).await {
            Ok(_) => sent += 1,
            Err(e) => warn!("Broadcast to {} failed: {}", id, e),
        }
    }
    bot.send_message(msg.chat.id, format!("✅ Broadcast delivered to {} users", sent))
        .await?;
    Ok(())
}

fn broadcast_text(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("/broadcast")?.trim();
    if rest.is_empty() { None } else { Some(rest) }
}

/// Normalize a Stars confirmation into the rail-agnostic event the
/// reconciler consumes. The charge id stringifies into the ledger
/// idempotency key; XTR invoices carry the star count directly, so no cent
/// division applies.
fn stars_event(
    tg_id: i64,
    username: Option<String>,
    charge_id: &TelegramTransactionId,
    stars: f64,
    invoice_payload: &str,
) -> PaymentEvent {
    let key = charge_id.to_string();
    let payload = match PaymentPayload::parse(invoice_payload) {
        Ok(payload) => Some(payload),
        Err(e) => {
            error!("Stars payment {} carries a bad payload: {}", key, e);
            None
        }
    };
    PaymentEvent {
        idempotency_key: key,
        tg_id,
        username,
        instrument: Instrument::Xtr,
        amount: stars,
        payload,
    }
}

/// A Stars confirmation arrived in-chat; normalize it and hand it to the
/// reconciler. The final outcome reaches the user through the notifier.
async fn successful_payment_handler(
    bot: Bot,
    msg: &Message,
    payment: &SuccessfulPayment,
    state: AppState,
) -> ResponseResult<()> {
    let tg_id = msg
        .from
        .as_ref()
        .map(|u| u.id.0 as i64)
        .unwrap_or(msg.chat.id.0);
    let username = msg.from.as_ref().and_then(|u| u.username.clone());

    let event = stars_event(
        tg_id,
        username,
        &payment.telegram_payment_charge_id,
        payment.total_amount as f64,
        &payment.invoice_payload,
    );
    let key = event.idempotency_key.clone();

    bot.send_message(msg.chat.id, "⏳ Setting up your VPN key...")
        .await?;

    if let Err(e) = state.reconciler.process(event).await {
        error!("Reconciliation of Stars payment {} failed: {}", key, e);
        let _ = bot
            .send_message(
                msg.chat.id,
                "❌ Something went wrong while settling your payment. Support has been notified.",
            )
            .await;
    }

    Ok(())
}

pub async fn callback_handler(bot: Bot, q: CallbackQuery, state: AppState) -> ResponseResult<()> {
    let Some(data) = q.data.clone() else {
        return Ok(());
    };
    let tg_id = q.from.id.0 as i64;
    let chat_id = ChatId(tg_id);

    bot.answer_callback_query(q.id.clone()).await?;

    match data.as_str() {
        "buy" => {
            bot.send_message(chat_id, "📦 Pick a plan:")
                .reply_markup(keyboards::tariff_menu(&state.pricing))
                .await?;
        }

        tariff_cb if tariff_cb.starts_with("tariff_") => {
            let key = tariff_cb.strip_prefix("tariff_").unwrap_or_default();
            let Ok(tariff) = state.pricing.get(key) else {
                warn!("Callback names unknown tariff {:?}", key);
                return Ok(());
            };
            bot.send_message(
                chat_id,
                format!(
                    "📌 Plan: {}\n💰 Price: {} ₽\n📆 Period: {} days\n\nPick a payment method:",
                    tariff.name, tariff.price, tariff.days
                ),
            )
            .reply_markup(keyboards::payment_menu(
                &state.pricing,
                tariff,
                state.cryptobot.is_some(),
            ))
            .await?;
        }

        stars_cb if stars_cb.starts_with("pay_stars_") => {
            let key = stars_cb.strip_prefix("pay_stars_").unwrap_or_default();
            let Ok(tariff) = state.pricing.get(key) else {
                return Ok(());
            };
            let stars = state.pricing.price_in_stars(tariff);
            let prices = vec![LabeledPrice {
                label: tariff.name.clone(),
                amount: stars as u32,
            }];

            bot.send_invoice(
                chat_id,
                format!("VPN {}", tariff.name),
                format!("Subscription for {} days", tariff.days),
                PaymentPayload::new(&tariff.key, tg_id).encode(),
                "XTR",
                prices,
            )
            .await?;
        }

        crypto_cb if crypto_cb.starts_with("pay_crypto_") => {
            let key = crypto_cb.strip_prefix("pay_crypto_").unwrap_or_default();
            let Ok(tariff) = state.pricing.get(key) else {
                return Ok(());
            };
            let Some(adapter) = &state.cryptobot else {
                return Ok(());
            };

            let amount = state.pricing.price_in_usdt(tariff);
            let payload = PaymentPayload::new(&tariff.key, tg_id);
            match adapter.create_invoice(tg_id, tariff, amount, &payload).await {
                Ok(invoice) => {
                    // Pending row now; the webhook completes it and settles.
                    if let Err(e) = state
                        .payments
                        .record(
                            &invoice.id,
                            tg_id,
                            tariff.price,
                            Instrument::Usdt,
                            Some(&tariff.key),
                        )
                        .await
                    {
                        error!("Failed to record invoice {}: {}", invoice.id, e);
                        let _ = bot
                            .send_message(chat_id, "❌ Could not create the invoice. Try again later.")
                            .await;
                        return Ok(());
                    }
                    bot.send_message(
                        chat_id,
                        format!(
                            "💳 Invoice for {:.2} USDT created. Pay here:\n{}",
                            amount, invoice.url
                        ),
                    )
                    .await?;
                }
                Err(e) => {
                    error!("CryptoBot invoice creation failed: {}", e);
                    let _ = bot
                        .send_message(chat_id, "❌ Could not create the invoice. Try again later.")
                        .await;
                }
            }
        }

        _ => {}
    }

    Ok(())
}

pub async fn pre_checkout_handler(bot: Bot, q: PreCheckoutQuery) -> ResponseResult<()> {
    bot.answer_pre_checkout_query(q.id, true).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stars_confirmation_maps_to_reconciler_event() {
        let charge = TelegramTransactionId("stars-ch-1".to_owned());
        let event = stars_event(7, Some("carol".to_string()), &charge, 50.0, "v1:month:7");

        assert_eq!(event.idempotency_key, "stars-ch-1");
        assert_eq!(event.amount, 50.0);
        assert!(matches!(event.instrument, Instrument::Xtr));
        assert_eq!(event.payload.unwrap().tariff, "month");
    }

    #[test]
    fn bad_stars_payload_is_dropped_not_fatal() {
        let charge = TelegramTransactionId("stars-ch-2".to_owned());
        let event = stars_event(7, None, &charge, 50.0, "garbage");

        // The pending-row fallback in the reconciler still gets a chance.
        assert_eq!(event.idempotency_key, "stars-ch-2");
        assert!(event.payload.is_none());
    }

    #[test]
    fn broadcast_text_requires_a_body() {
        assert_eq!(broadcast_text("/broadcast  hello all "), Some("hello all"));
        assert_eq!(broadcast_text("/broadcast"), None);
        assert_eq!(broadcast_text("/broadcast   "), None);
        assert_eq!(broadcast_text("/start"), None);
    }
}
