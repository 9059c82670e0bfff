use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::pricing::{PricingTable, Tariff};

pub fn main_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "🛒 Buy subscription",
        "buy",
    )]])
}

pub fn tariff_menu(pricing: &PricingTable) -> InlineKeyboardMarkup {
    let rows = pricing
        .tariffs()
        .iter()
        .map(|t| {
            vec![InlineKeyboardButton::callback(
                format!("{} — {} ₽", t.name, t.price),
                format!("tariff_{}", t.key),
            )]
        })
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}

pub fn payment_menu(
    pricing: &PricingTable,
    tariff: &Tariff,
    cryptobot_enabled: bool,
) -> InlineKeyboardMarkup {
    let mut rows = vec![vec![InlineKeyboardButton::callback(
        format!("⭐️ Pay {} Stars", pricing.price_in_stars(tariff)),
        format!("pay_stars_{}", tariff.key),
    )]];
    if cryptobot_enabled {
        rows.push(vec![InlineKeyboardButton::callback(
            format!("💲 Pay {:.2} USDT (CryptoBot)", pricing.price_in_usdt(tariff)),
            format!("pay_crypto_{}", tariff.key),
        )]);
    }
    InlineKeyboardMarkup::new(rows)
}
