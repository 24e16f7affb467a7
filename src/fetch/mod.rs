pub mod client;
pub mod mock;

use async_trait::async_trait;
use std::fmt;

use crate::failures::FailureType;
use crate::requests::ReportRequest;
use crate::types::Report;

/// Typed failure causes for a report fetch.
///
/// This is the closed taxonomy the whole failure-tracking path is built on:
/// every error a fetcher can produce is one of these variants, and
/// [`FetchError::failure_type`] is the single place it maps onto the ledger's
/// [`FailureType`]. New fetch-path failure causes must be added here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Vendor API rejected the call or communication broke down
    Api {
        message: String,
        status_code: Option<u16>,
    },
    /// The call exceeded its deadline
    Timeout(String),
    /// The vendor answered but the report body was empty or unusable
    EmptyReport(String),
    /// The report exists but is still being generated on the vendor side
    Processing(String),
    /// Vendor-side rate limiting (HTTP 429)
    RateLimit(String),
    /// Invalid or expired credentials (HTTP 401/403)
    Authentication(String),
    /// Anything not covered by the taxonomy above
    Other(String),
}

impl FetchError {
    /// Total classification into the ledger taxonomy; [`FetchError::Other`]
    /// is the only variant that lands on [`FailureType::Unknown`].
    pub fn failure_type(&self) -> FailureType {
        match self {
            FetchError::Api { .. } => FailureType::ApiError,
            FetchError::Timeout(_) => FailureType::Timeout,
            FetchError::EmptyReport(_) => FailureType::EmptyReport,
            FetchError::Processing(_) => FailureType::ProcessingError,
            FetchError::RateLimit(_) => FailureType::RateLimit,
            FetchError::Authentication(_) => FailureType::Authentication,
            FetchError::Other(_) => FailureType::Unknown,
        }
    }

    /// Whether the retry executor should attempt this error again.
    /// Bad credentials never get better by retrying.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Authentication(_))
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Api {
                message,
                status_code: Some(code),
            } => write!(f, "API error ({}): {}", code, message),
            FetchError::Api { message, .. } => write!(f, "API error: {}", message),
            FetchError::Timeout(msg) => write!(f, "timeout: {}", msg),
            FetchError::EmptyReport(msg) => write!(f, "empty report: {}", msg),
            FetchError::Processing(msg) => write!(f, "report still processing: {}", msg),
            FetchError::RateLimit(msg) => write!(f, "rate limited: {}", msg),
            FetchError::Authentication(msg) => write!(f, "authentication failed: {}", msg),
            FetchError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

/// The fetch collaborator seam: one fallible operation per report request.
///
/// The orchestrator depends only on this contract; HTTP details live behind it.
#[async_trait]
pub trait ReportFetcher: Send + Sync {
    async fn fetch(&self, request: &ReportRequest) -> Result<Report, FetchError>;
}

/// Canonical filename for a fetched report:
/// `relatorio_<endpoint>_<portfolio>_<yyyymmdd><ext>`
pub fn report_filename(request: &ReportRequest) -> String {
    let portfolio_part = request
        .portfolio()
        .map(|p| p.id.clone())
        .unwrap_or_else(|| "todas_as_carteiras".to_string());

    format!(
        "relatorio_{}_{}_{}{}",
        request.endpoint(),
        portfolio_part,
        request.date().format("%Y%m%d"),
        request.format().extension()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_is_total() {
        let cases = [
            (
                FetchError::Api {
                    message: "500".into(),
                    status_code: Some(500),
                },
                FailureType::ApiError,
            ),
            (FetchError::Timeout("60s".into()), FailureType::Timeout),
            (
                FetchError::EmptyReport("0 bytes".into()),
                FailureType::EmptyReport,
            ),
            (
                FetchError::Processing("try later".into()),
                FailureType::ProcessingError,
            ),
            (FetchError::RateLimit("429".into()), FailureType::RateLimit),
            (
                FetchError::Authentication("bad key".into()),
                FailureType::Authentication,
            ),
            (FetchError::Other("boom".into()), FailureType::Unknown),
        ];

        for (error, expected) in cases {
            assert_eq!(error.failure_type(), expected);
        }
    }

    #[test]
    fn test_only_authentication_is_non_retryable() {
        assert!(!FetchError::Authentication("bad key".into()).is_retryable());
        assert!(FetchError::Timeout("60s".into()).is_retryable());
        assert!(FetchError::Other("boom".into()).is_retryable());
    }
}
