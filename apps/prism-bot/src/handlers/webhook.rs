use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::payload::PaymentPayload;
use crate::services::reconciler::{PaymentEvent, ReconcileOutcome};
use crate::state::AppState;
use prism_db::models::store::{Instrument, SubscriptionStatus};

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/payments/cryptobot", post(cryptobot_webhook))
        .route("/internal/stats", get(internal_stats))
        .route(
            "/internal/subscriptions/{panel_name}",
            delete(revoke_subscription),
        )
        .with_state(state)
}

async fn index() -> &'static str {
    "Prism VPN bot is running!"
}

#[derive(Deserialize)]
struct CryptoWebhook {
    event: String,
    payload: CryptoInvoice,
}

#[derive(Deserialize)]
struct CryptoInvoice {
    invoice_id: i64,
    /// Paid amount in the invoice asset; not every delivery echoes it.
    amount: Option<String>,
    payload: Option<String>,
}

/// Inbound confirmation from the crypto processor. Duplicates still answer
/// 200 so the sender stops retrying; unparseable requests answer 4xx and get
/// logged loudly for manual follow-up.
async fn cryptobot_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let Some(adapter) = &state.cryptobot else {
        return (StatusCode::BAD_REQUEST, "CryptoBot not configured").into_response();
    };

    let signature = headers
        .get("crypto-pay-api-signature")
        .and_then(|v| v.to_str().ok());
    if let Err(e) = adapter.verify_signature(&body, signature) {
        warn!("Rejected CryptoBot webhook: {}", e);
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let update: CryptoWebhook = match serde_json::from_str(&body) {
        Ok(update) => update,
        Err(e) => {
            error!("Unparseable CryptoBot webhook body: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    if update.event != "invoice_paid" {
        return StatusCode::OK.into_response();
    }

    let invoice = update.payload;
    let key = invoice.invoice_id.to_string();

    let payload = match invoice.payload.as_deref().map(PaymentPayload::parse) {
        Some(Ok(payload)) => Some(payload),
        Some(Err(e)) => {
            // The pending invoice row can still resolve the purchase; keep
            // going but leave a loud trace for follow-up.
            error!("CryptoBot invoice {} carries a bad payload: {}", key, e);
            None
        }
        None => None,
    };

    // Route the event to its owner: the payload names the payer, otherwise
    // the row recorded at invoice time does.
    let tg_id = match &payload {
        Some(p) => p.tg_id,
        None => match state.payments.get(&key).await {
            Ok(Some(row)) => row.user_id,
            Ok(None) => {
                error!(
                    "CryptoBot invoice {} has no payload and no recorded invoice; manual review needed",
                    key
                );
                return StatusCode::BAD_REQUEST.into_response();
            }
            Err(e) => {
                error!("Ledger lookup for invoice {} failed: {}", key, e);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        },
    };

    let amount = invoice
        .amount
        .as_deref()
        .and_then(|a| a.parse::<f64>().ok())
        .unwrap_or(0.0);

    let event = PaymentEvent {
        idempotency_key: key.clone(),
        tg_id,
        username: None,
        instrument: Instrument::Usdt,
        amount,
        payload,
    };

    match state.reconciler.process(event).await {
        Ok(ReconcileOutcome::Duplicate) => {
            info!("CryptoBot invoice {} already settled", key);
            StatusCode::OK.into_response()
        }
        Ok(_) => StatusCode::OK.into_response(),
        Err(e) => {
            error!("Reconciliation of invoice {} failed: {}", key, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn authorize_internal_request(state: &AppState, headers: &HeaderMap) -> Result<(), StatusCode> {
    let token = extract_bearer_token(headers).ok_or(StatusCode::UNAUTHORIZED)?;
    match &state.internal_api_token {
        Some(expected) if !expected.trim().is_empty() && expected == token => Ok(()),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

#[derive(Serialize)]
struct StatsResponse {
    users: i64,
    revenue: i64,
    active_subscriptions: i64,
    total_subscriptions: i64,
}

async fn internal_stats(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(status) = authorize_internal_request(&state, &headers) {
        return status.into_response();
    }

    let now = Utc::now();
    let stats = async {
        Ok::<_, prism_db::error::LedgerError>(StatsResponse {
            users: state.users.count().await?,
            revenue: state.payments.total_revenue().await?,
            active_subscriptions: state.subs.count_active(now).await?,
            total_subscriptions: state.subs.count_total().await?,
        })
    }
    .await;

    match stats {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => {
            error!("Stats query failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Administrative revocation: best-effort on the panel side, recorded in the
/// ledger regardless. Not part of the payment path's guarantees.
async fn revoke_subscription(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(panel_name): Path<String>,
) -> impl IntoResponse {
    if let Err(status) = authorize_internal_request(&state, &headers) {
        return status.into_response();
    }

    match state.subs.get_by_panel_name(&panel_name).await {
        Ok(Some(_)) => {}
        Ok(None) => return (StatusCode::NOT_FOUND, "Subscription not found").into_response(),
        Err(e) => {
            error!("Subscription lookup failed: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    if let Err(e) = state.panel.delete_account(&panel_name).await {
        warn!("Panel delete for {} failed: {}", panel_name, e);
    }

    match state
        .subs
        .update_status(&panel_name, SubscriptionStatus::Revoked)
        .await
    {
        Ok(_) => {
            info!("Revoked subscription {}", panel_name);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            error!("Revocation update for {} failed: {}", panel_name, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert("Authorization", HeaderValue::from_static("Bearer secret"));
        assert_eq!(extract_bearer_token(&headers), Some("secret"));

        headers.insert("Authorization", HeaderValue::from_static("Basic secret"));
        assert_eq!(extract_bearer_token(&headers), None);
    }
}
