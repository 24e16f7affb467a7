use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::failures::epoch_secs;

/// Catalogued failure causes. Each type carries its own retry ceiling and
/// backoff base, so a rate-limited portfolio is nursed along for much longer
/// than one with broken credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    ApiError,
    Timeout,
    EmptyReport,
    ProcessingError,
    RateLimit,
    Authentication,
    Unknown,
}

impl FailureType {
    /// Retry ceiling: a record at or past this attempt count is abandoned
    pub fn max_attempts(&self) -> u32 {
        match self {
            FailureType::ApiError => 5,
            FailureType::Timeout => 3,
            FailureType::EmptyReport => 2,
            FailureType::ProcessingError => 2,
            // Rate limiting is usually transient, keep trying
            FailureType::RateLimit => 10,
            // Credentials do not fix themselves
            FailureType::Authentication => 1,
            FailureType::Unknown => 3,
        }
    }

    /// First-retry delay in seconds; doubles with every further attempt
    pub fn base_delay_secs(&self) -> f64 {
        match self {
            FailureType::ApiError => 60.0,
            FailureType::Timeout => 30.0,
            FailureType::EmptyReport => 120.0,
            FailureType::ProcessingError => 180.0,
            FailureType::RateLimit => 300.0,
            FailureType::Authentication => 600.0,
            FailureType::Unknown => 90.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::ApiError => "api_error",
            FailureType::Timeout => "timeout",
            FailureType::EmptyReport => "empty_report",
            FailureType::ProcessingError => "processing_error",
            FailureType::RateLimit => "rate_limit",
            FailureType::Authentication => "authentication",
            FailureType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The most recent unresolved failure for one portfolio.
///
/// At most one record exists per portfolio id; a new failure replaces the
/// prior record while `attempt_count` keeps growing until a success clears it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub portfolio_id: String,
    pub portfolio_name: String,
    pub failure_type: FailureType,
    pub error_message: String,
    /// Seconds since the Unix epoch, time of this attempt
    pub timestamp: f64,
    /// Monotonic per portfolio across failures, >= 1
    pub attempt_count: u32,
    /// Which report endpoint failed ("32", "1048", "1799", "1988")
    pub endpoint: String,
    /// Request parameters at failure time, for diagnostics and export only
    pub request_params: Map<String, Value>,
    #[serde(default)]
    pub stack_trace: Option<String>,
}

impl FailureRecord {
    /// Age of this failure in minutes
    pub fn age_minutes(&self) -> f64 {
        (epoch_secs() - self.timestamp) / 60.0
    }

    /// Whether the retry ceiling for this failure type has been reached
    pub fn should_retry(&self) -> bool {
        self.attempt_count < self.failure_type.max_attempts()
    }

    /// Delay before the next retry: type-specific base with exponential
    /// growth over attempts. No jitter here; jitter belongs to the
    /// backoff executor, not the ledger.
    pub fn retry_delay_seconds(&self) -> f64 {
        self.failure_type.base_delay_secs() * 2f64.powi(self.attempt_count as i32 - 1)
    }
}
