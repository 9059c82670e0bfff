use prism_db::models::store::Instrument;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown tariff: {0}")]
pub struct UnknownTariff(pub String);

#[derive(Debug, Clone)]
pub struct Tariff {
    pub key: String,
    pub name: String,
    pub days: i64,
    /// Price in the settlement currency (whole rubles).
    pub price: i64,
}

/// Static price list plus the fixed conversion rates for each instrument.
/// Immutable after startup; lookups only.
#[derive(Debug, Clone)]
pub struct PricingTable {
    tariffs: Vec<Tariff>,
    star_price_rub: f64,
    usdt_price_rub: f64,
}

impl PricingTable {
    pub fn standard(star_price_rub: f64, usdt_price_rub: f64) -> Self {
        let tariffs = vec![
            Tariff {
                key: "month".into(),
                name: "1 month".into(),
                days: 30,
                price: 100,
            },
            Tariff {
                key: "quarter".into(),
                name: "3 months".into(),
                days: 90,
                price: 250,
            },
            Tariff {
                key: "year".into(),
                name: "1 year".into(),
                days: 365,
                price: 900,
            },
        ];
        Self {
            tariffs,
            star_price_rub,
            usdt_price_rub,
        }
    }

    pub fn tariffs(&self) -> &[Tariff] {
        &self.tariffs
    }

    pub fn get(&self, key: &str) -> Result<&Tariff, UnknownTariff> {
        self.tariffs
            .iter()
            .find(|t| t.key == key)
            .ok_or_else(|| UnknownTariff(key.to_string()))
    }

    /// Stars the user must send for a tariff. Rounded up: the settlement
    /// price must never be underpaid.
    pub fn price_in_stars(&self, tariff: &Tariff) -> i64 {
        (tariff.price as f64 / self.star_price_rub).ceil() as i64
    }

    /// USDT the user must send, rounded up to whole cents.
    pub fn price_in_usdt(&self, tariff: &Tariff) -> f64 {
        (tariff.price as f64 / self.usdt_price_rub * 100.0).ceil() / 100.0
    }

    /// Settlement value of an instrument amount already paid, rounded to the
    /// nearest ruble.
    pub fn to_settlement(&self, instrument: Instrument, amount: f64) -> i64 {
        let rate = match instrument {
            Instrument::Xtr => self.star_price_rub,
            Instrument::Usdt => self.usdt_price_rub,
        };
        (amount * rate).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PricingTable {
        PricingTable::standard(1.65, 90.0)
    }

    #[test]
    fn unknown_tariff_is_rejected() {
        let err = table().get("gold").unwrap_err();
        assert_eq!(err.0, "gold");
    }

    #[test]
    fn instrument_prices_round_up() {
        let table = table();
        let month = table.get("month").unwrap().clone();
        // 100 / 1.65 = 60.6..., the user pays 61 stars, never 60.
        assert_eq!(table.price_in_stars(&month), 61);
        // 100 / 90 = 1.111..., charged as 1.12 USDT.
        assert_eq!(table.price_in_usdt(&month), 1.12);
    }

    #[test]
    fn settlement_credit_rounds_to_nearest() {
        let table = table();
        // 61 stars * 1.65 = 100.65 -> 101 rubles credited.
        assert_eq!(table.to_settlement(Instrument::Xtr, 61.0), 101);
        // 1.12 USDT * 90 = 100.8 -> 101 rubles credited.
        assert_eq!(table.to_settlement(Instrument::Usdt, 1.12), 101);
    }
}
