use anyhow::{Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use super::{Invoice, PaymentAdapter};
use crate::payload::PaymentPayload;
use crate::pricing::Tariff;

const API_BASE: &str = "https://pay.crypt.bot/api";
const REMOTE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

type HmacSha256 = Hmac<Sha256>;

pub struct CryptoBotAdapter {
    api_token: String,
    http: reqwest::Client,
}

impl CryptoBotAdapter {
    pub fn new(api_token: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REMOTE_TIMEOUT)
            .build()
            .context("Failed to build CryptoBot HTTP client")?;
        Ok(Self { api_token, http })
    }

    /// Webhook HMAC key: SHA-256 of the API token, per the Crypto Pay scheme.
    fn webhook_key(&self) -> [u8; 32] {
        Sha256::digest(self.api_token.as_bytes()).into()
    }
}

#[async_trait]
impl PaymentAdapter for CryptoBotAdapter {
    async fn create_invoice(
        &self,
        _tg_id: i64,
        tariff: &Tariff,
        amount: f64,
        payload: &PaymentPayload,
    ) -> Result<Invoice> {
        #[derive(Deserialize)]
        struct Envelope {
            ok: bool,
            result: Option<InvoiceResult>,
        }

        #[derive(Deserialize)]
        struct InvoiceResult {
            invoice_id: i64,
            #[serde(alias = "bot_invoice_url")]
            pay_url: String,
        }

        let resp = self
            .http
            .post(format!("{}/createInvoice", API_BASE))
            .header("Crypto-Pay-API-Token", &self.api_token)
            .json(&json!({
                "asset": "USDT",
                "amount": format!("{:.2}", amount),
                "description": format!("VPN access: {} ({} days)", tariff.name, tariff.days),
                "payload": payload.encode(),
            }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow::anyhow!(
                "CryptoBot createInvoice returned {}",
                resp.status()
            ));
        }

        let envelope: Envelope = resp.json().await?;
        match envelope.result {
            Some(result) if envelope.ok => Ok(Invoice {
                id: result.invoice_id.to_string(),
                url: result.pay_url,
            }),
            _ => Err(anyhow::anyhow!("CryptoBot rejected the invoice")),
        }
    }

    fn verify_signature(&self, body: &str, signature: Option<&str>) -> Result<()> {
        let signature = signature
            .ok_or_else(|| anyhow::anyhow!("Missing crypto-pay-api-signature header"))?;

        let mut mac = HmacSha256::new_from_slice(&self.webhook_key())
            .context("Failed to build webhook HMAC")?;
        mac.update(body.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        if expected == signature.to_ascii_lowercase() {
            Ok(())
        } else {
            Err(anyhow::anyhow!("Invalid CryptoBot webhook signature"))
        }
    }

    fn name(&self) -> &str {
        "cryptobot"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(token: &str, body: &str) -> String {
        let key: [u8; 32] = Sha256::digest(token.as_bytes()).into();
        let mut mac = HmacSha256::new_from_slice(&key).unwrap();
        mac.update(body.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_a_valid_signature() {
        let adapter = CryptoBotAdapter::new("test-token".to_string()).unwrap();
        let body = r#"{"event":"invoice_paid","payload":{"invoice_id":42}}"#;
        let sig = sign("test-token", body);
        assert!(adapter.verify_signature(body, Some(&sig)).is_ok());
    }

    #[test]
    fn rejects_tampered_body_and_missing_header() {
        let adapter = CryptoBotAdapter::new("test-token".to_string()).unwrap();
        let body = r#"{"event":"invoice_paid","payload":{"invoice_id":42}}"#;
        let sig = sign("test-token", body);

        assert!(
            adapter
                .verify_signature(r#"{"event":"invoice_paid","payload":{"invoice_id":43}}"#, Some(&sig))
                .is_err()
        );
        assert!(adapter.verify_signature(body, None).is_err());
    }
}
