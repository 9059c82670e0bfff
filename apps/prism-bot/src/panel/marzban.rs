use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::warn;

use super::{PanelError, VpnPanel, bump_expiry};

const REMOTE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
const TOKEN_TTL_HOURS: i64 = 1;

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Authenticated client for a Marzban-style panel. Owns a process-wide token
/// cache; the token is refreshed lazily by whichever caller finds it expired
/// (the auth endpoint tolerates concurrent refreshes, last write wins).
pub struct MarzbanClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    token: RwLock<Option<CachedToken>>,
}

impl MarzbanClient {
    pub fn new(base_url: String, username: String, password: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REMOTE_TIMEOUT)
            .build()
            .context("Failed to build panel HTTP client")?;
        Ok(Self {
            http,
            base_url,
            username,
            password,
            token: RwLock::new(None),
        })
    }

    async fn authenticate(&self) -> Result<String, PanelError> {
        if let Some(cached) = self.token.read().await.as_ref() {
            if Utc::now() < cached.expires_at {
                return Ok(cached.token.clone());
            }
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let resp = self
            .http
            .post(format!("{}/api/admin/token", self.base_url))
            .json(&json!({ "username": self.username, "password": self.password }))
            .send()
            .await;

        match resp {
            Ok(resp) if resp.status().is_success() => {
                let body: TokenResponse = resp.json().await.map_err(|e| {
                    warn!("Panel auth returned an unreadable body: {}", e);
                    PanelError::AuthFailed
                })?;
                let mut guard = self.token.write().await;
                *guard = Some(CachedToken {
                    token: body.access_token.clone(),
                    expires_at: Utc::now() + Duration::hours(TOKEN_TTL_HOURS),
                });
                Ok(body.access_token)
            }
            Ok(resp) => {
                warn!("Panel auth rejected: {}", resp.status());
                self.token.write().await.take();
                Err(PanelError::AuthFailed)
            }
            Err(e) => {
                warn!("Panel auth transport error: {}", e);
                self.token.write().await.take();
                Err(PanelError::AuthFailed)
            }
        }
    }
}

fn transport(e: reqwest::Error) -> PanelError {
    PanelError::ProvisionFailed(e.to_string())
}

#[async_trait]
impl VpnPanel for MarzbanClient {
    async fn create_account(
        &self,
        name: &str,
        duration_days: i64,
        traffic_limit_bytes: u64,
    ) -> Result<String, PanelError> {
        let token = self.authenticate().await?;
        let expire = (Utc::now() + Duration::days(duration_days)).timestamp();

        let resp = self
            .http
            .post(format!("{}/api/user", self.base_url))
            .bearer_auth(&token)
            .json(&json!({
                "username": name,
                "proxies": { "vless": {} },
                "expire": expire,
                "data_limit": traffic_limit_bytes,
                "status": "active",
            }))
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(PanelError::ProvisionFailed(format!(
                "create returned {}",
                resp.status()
            )));
        }

        // The connection credential comes from a second call; the panel keeps
        // config rendering separate from account creation.
        #[derive(Deserialize)]
        struct ConfigResponse {
            link: String,
        }

        let resp = self
            .http
            .get(format!("{}/api/user/{}/config", self.base_url, name))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(PanelError::ProvisionFailed(format!(
                "config fetch returned {}",
                resp.status()
            )));
        }
        let config: ConfigResponse = resp
            .json()
            .await
            .map_err(|e| PanelError::ProvisionFailed(e.to_string()))?;
        Ok(config.link)
    }

    async fn extend_account(
        &self,
        name: &str,
        duration_days: i64,
    ) -> Result<DateTime<Utc>, PanelError> {
        let current = self.account_expiry(name).await?;
        let new_expiry = bump_expiry(current, Utc::now(), duration_days);

        let token = self.authenticate().await?;
        let resp = self
            .http
            .put(format!("{}/api/user/{}", self.base_url, name))
            .bearer_auth(&token)
            .json(&json!({ "expire": new_expiry.timestamp() }))
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(PanelError::ProvisionFailed(format!(
                "extend returned {}",
                resp.status()
            )));
        }
        Ok(new_expiry)
    }

    async fn account_expiry(&self, name: &str) -> Result<Option<DateTime<Utc>>, PanelError> {
        let token = self.authenticate().await?;

        #[derive(Deserialize)]
        struct UserResponse {
            expire: Option<i64>,
        }

        let resp = self
            .http
            .get(format!("{}/api/user/{}", self.base_url, name))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(transport)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(PanelError::ProvisionFailed(format!(
                "user lookup returned {}",
                resp.status()
            )));
        }
        let user: UserResponse = resp
            .json()
            .await
            .map_err(|e| PanelError::ProvisionFailed(e.to_string()))?;
        Ok(user.expire.and_then(|ts| DateTime::from_timestamp(ts, 0)))
    }

    async fn delete_account(&self, name: &str) -> Result<(), PanelError> {
        let token = self.authenticate().await?;
        let resp = self
            .http
            .delete(format!("{}/api/user/{}", self.base_url, name))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
            return Err(PanelError::ProvisionFailed(format!(
                "delete returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}
