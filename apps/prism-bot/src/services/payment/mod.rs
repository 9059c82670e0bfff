use anyhow::Result;
use async_trait::async_trait;

use crate::payload::PaymentPayload;
use crate::pricing::Tariff;

pub mod cryptobot;

#[derive(Debug, Clone)]
pub struct Invoice {
    /// Processor-side invoice id; doubles as the payment idempotency key.
    pub id: String,
    pub url: String,
}

/// An external payment processor: creates invoices and authenticates the
/// webhooks it later delivers for them.
#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// Create an invoice in the adapter's own currency and return the
    /// payment URL to hand to the user.
    async fn create_invoice(
        &self,
        tg_id: i64,
        tariff: &Tariff,
        amount: f64,
        payload: &PaymentPayload,
    ) -> Result<Invoice>;

    /// Verify the webhook signature over the raw request body.
    fn verify_signature(&self, body: &str, signature: Option<&str>) -> Result<()>;

    /// Get the adapter name.
    fn name(&self) -> &str;
}
