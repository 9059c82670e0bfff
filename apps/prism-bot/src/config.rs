use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub bind_addr: String,
    pub marzban_url: String,
    pub marzban_user: String,
    pub marzban_pass: String,
    pub cryptobot_token: Option<String>,
    pub internal_api_token: Option<String>,
    pub admin_ids: Vec<i64>,
    /// Fixed conversion rates between the settlement currency and each
    /// payment instrument's unit.
    pub star_price_rub: f64,
    pub usdt_price_rub: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bot_token: env::var("BOT_TOKEN").context("BOT_TOKEN is not set")?,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string()),
            marzban_url: env::var("MARZBAN_URL")
                .unwrap_or_else(|_| "http://localhost:8443".to_string()),
            marzban_user: env::var("MARZBAN_USER").unwrap_or_else(|_| "admin".to_string()),
            marzban_pass: env::var("MARZBAN_PASS").context("MARZBAN_PASS is not set")?,
            cryptobot_token: non_empty(env::var("CRYPTOBOT_TOKEN").ok()),
            internal_api_token: non_empty(env::var("INTERNAL_API_TOKEN").ok()),
            admin_ids: parse_admin_ids(&env::var("ADMIN_IDS").unwrap_or_default()),
            star_price_rub: parse_rate("STAR_PRICE_RUB", 1.65)?,
            usdt_price_rub: parse_rate("USDT_PRICE_RUB", 90.0)?,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_admin_ids(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

fn parse_rate(key: &str, default: f64) -> Result<f64> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number", key)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_ids_parse_loosely() {
        assert_eq!(parse_admin_ids("1, 2,junk,3"), vec![1, 2, 3]);
        assert!(parse_admin_ids("").is_empty());
    }
}
