//! Error taxonomy of the price pipeline

use thiserror::Error;

/// A single failure inside the price pipeline.
#[derive(Debug, Error)]
pub enum PriceError {
    /// Monthly call ceiling reached. Soft limit, see `QuotaGuard`.
    #[error("Monthly API quota exceeded: {used} of {ceiling} calls used")]
    QuotaExceeded { used: u64, ceiling: u64 },

    #[error("Rate limit exceeded for {key}: at most {limit} calls per minute")]
    RateLimitExceeded { key: String, limit: u32 },

    /// Transport failure, non-2xx status or a payload we could not parse.
    #[error("Upstream request failed ({}): {body}", describe_status(.status))]
    Upstream { status: Option<u16>, body: String },

    #[error("No price data returned for {coin_id}")]
    EmptyResult { coin_id: String },

    #[error("Invalid price request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

fn describe_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "no response".to_string(), |s| format!("status {s}"))
}

/// Terminal failure of a price request: the live path failed and no cached
/// series could stand in for it. Carries the original cause.
#[derive(Debug, Error)]
#[error("Failed to fetch price data: {cause}")]
pub struct FetchError {
    #[source]
    cause: PriceError,
}

impl FetchError {
    pub fn new(cause: PriceError) -> Self {
        Self { cause }
    }

    pub fn cause(&self) -> &PriceError {
        &self.cause
    }

    pub fn into_cause(self) -> PriceError {
        self.cause
    }
}

impl From<PriceError> for FetchError {
    fn from(cause: PriceError) -> Self {
        Self::new(cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_message_includes_status_and_body() {
        let err = PriceError::Upstream {
            status: Some(429),
            body: "Too Many Requests".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Upstream request failed (status 429): Too Many Requests"
        );

        let err = PriceError::Upstream {
            status: None,
            body: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Upstream request failed (no response): connection refused"
        );
    }

    #[test]
    fn test_fetch_error_chains_original_cause() {
        let err = FetchError::new(PriceError::EmptyResult {
            coin_id: "project89".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Failed to fetch price data: No price data returned for project89"
        );
        assert!(matches!(err.cause(), PriceError::EmptyResult { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }
}
