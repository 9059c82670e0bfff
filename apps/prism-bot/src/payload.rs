use thiserror::Error;

const VERSION: &str = "v1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("unsupported payload version: {0}")]
    Version(String),
    #[error("malformed payment payload")]
    Malformed,
}

/// Application payload carried through a payment rail and echoed back with
/// the confirmation: which tariff was bought, and by whom. Versioned and
/// parsed strictly at the boundary; anything unparseable is rejected there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentPayload {
    pub tariff: String,
    pub tg_id: i64,
}

impl PaymentPayload {
    pub fn new(tariff: &str, tg_id: i64) -> Self {
        Self {
            tariff: tariff.to_string(),
            tg_id,
        }
    }

    pub fn encode(&self) -> String {
        format!("{}:{}:{}", VERSION, self.tariff, self.tg_id)
    }

    pub fn parse(raw: &str) -> Result<Self, PayloadError> {
        let mut parts = raw.splitn(3, ':');
        let version = parts.next().ok_or(PayloadError::Malformed)?;
        if version != VERSION {
            return Err(PayloadError::Version(version.to_string()));
        }
        let tariff = parts.next().filter(|t| !t.is_empty()).ok_or(PayloadError::Malformed)?;
        let tg_id = parts
            .next()
            .and_then(|id| id.parse().ok())
            .ok_or(PayloadError::Malformed)?;
        Ok(Self {
            tariff: tariff.to_string(),
            tg_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let payload = PaymentPayload::new("month", 123456789);
        assert_eq!(payload.encode(), "v1:month:123456789");
        assert_eq!(PaymentPayload::parse(&payload.encode()).unwrap(), payload);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(
            PaymentPayload::parse("stars_month_42"),
            Err(PayloadError::Version("stars_month_42".to_string()))
        );
        assert_eq!(
            PaymentPayload::parse("v2:month:42"),
            Err(PayloadError::Version("v2".to_string()))
        );
        assert_eq!(PaymentPayload::parse("v1::42"), Err(PayloadError::Malformed));
        assert_eq!(
            PaymentPayload::parse("v1:month:notanumber"),
            Err(PayloadError::Malformed)
        );
        assert_eq!(PaymentPayload::parse("v1:month"), Err(PayloadError::Malformed));
    }
}
