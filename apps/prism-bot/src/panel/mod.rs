use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

pub mod marzban;

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("panel authentication failed")]
    AuthFailed,
    #[error("provisioning request failed: {0}")]
    ProvisionFailed(String),
}

/// Remote VPN-panel operations, keyed by an opaque account name. No retries
/// inside implementations; a retry after `create_account` risks a duplicate
/// remote account, so retry policy belongs to callers.
#[async_trait]
pub trait VpnPanel: Send + Sync {
    /// Create a fresh account expiring `duration_days` from now and return
    /// its opaque connection credential.
    async fn create_account(
        &self,
        name: &str,
        duration_days: i64,
        traffic_limit_bytes: u64,
    ) -> Result<String, PanelError>;

    /// Push the account's expiry to `max(remote expiry, now) + duration`,
    /// returning the new expiry.
    async fn extend_account(&self, name: &str, duration_days: i64)
    -> Result<DateTime<Utc>, PanelError>;

    /// Current remote expiry, or `None` when the account does not exist.
    async fn account_expiry(&self, name: &str) -> Result<Option<DateTime<Utc>>, PanelError>;

    /// Best-effort removal, for administrative cleanup only. Callers log
    /// failures instead of treating them as fatal.
    async fn delete_account(&self, name: &str) -> Result<(), PanelError>;
}

/// Extension is additive from the later of (current expiry, now): a lapsed
/// account gets exactly now + duration, never a retroactively shortened
/// grant and never a double-counted one.
pub fn bump_expiry(
    current: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    duration_days: i64,
) -> DateTime<Utc> {
    let base = current.filter(|c| *c > now).unwrap_or(now);
    base + Duration::days(duration_days)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extends_from_future_expiry() {
        let now = Utc::now();
        let current = now + Duration::days(5);
        assert_eq!(bump_expiry(Some(current), now, 30), current + Duration::days(30));
    }

    #[test]
    fn lapsed_expiry_restarts_from_now() {
        let now = Utc::now();
        let lapsed = now - Duration::days(90);
        assert_eq!(bump_expiry(Some(lapsed), now, 30), now + Duration::days(30));
    }

    #[test]
    fn missing_expiry_starts_from_now() {
        let now = Utc::now();
        assert_eq!(bump_expiry(None, now, 7), now + Duration::days(7));
    }

    #[test]
    fn never_decreases() {
        let now = Utc::now();
        let current = now + Duration::days(5);
        assert!(bump_expiry(Some(current), now, 1) > current);
    }
}
