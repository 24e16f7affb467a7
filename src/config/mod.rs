use log::warn;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::batch::BatchConfig;
use crate::resilience::{BackoffConfig, CircuitBreakerConfig};

/// Missing or unusable configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    fn missing(var: &str) -> Self {
        Self {
            message: format!("{} not set in the environment", var),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

fn env_or<T: FromStr>(var: &str, default: T) -> T {
    match env::var(var) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring unparsable {}={}", var, raw);
                default
            }
        },
        Err(_) => default,
    }
}

/// Vendor API connection settings
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub rate_limit_calls: usize,
    pub rate_limit_period: Duration,
}

impl ApiSettings {
    /// Read settings from the environment (a `.env` file is honored).
    /// `REPORT_API_KEY` and `REPORT_API_URL` are required; the rest default.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let api_key =
            env::var("REPORT_API_KEY").map_err(|_| ConfigError::missing("REPORT_API_KEY"))?;
        let base_url =
            env::var("REPORT_API_URL").map_err(|_| ConfigError::missing("REPORT_API_URL"))?;

        Ok(Self {
            api_key,
            base_url,
            timeout: Duration::from_secs(env_or("API_TIMEOUT_SECS", 60)),
            rate_limit_calls: env_or("RATE_LIMIT_CALLS", 30),
            rate_limit_period: Duration::from_secs(env_or("RATE_LIMIT_PERIOD_SECS", 60)),
        })
    }
}

/// Batch orchestration settings
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub checkpoint_dir: PathBuf,
    pub rate_limit_delay: Duration,
    pub retry_max_attempts: u32,
    pub retry_base_wait: Duration,
    pub retry_jitter: f64,
    pub breaker_failure_threshold: u32,
    pub breaker_reset_timeout: Duration,
}

impl BatchSettings {
    /// Read settings from the environment; everything has a default
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            checkpoint_dir: PathBuf::from(env_or(
                "CHECKPOINT_DIR",
                "./checkpoints".to_string(),
            )),
            rate_limit_delay: Duration::from_millis(env_or("RATE_LIMIT_DELAY_MS", 1000)),
            retry_max_attempts: env_or("RETRY_MAX_ATTEMPTS", 5),
            retry_base_wait: Duration::from_millis(env_or("RETRY_BASE_WAIT_MS", 2000)),
            retry_jitter: env_or("RETRY_JITTER", 0.3),
            breaker_failure_threshold: env_or("BREAKER_FAILURE_THRESHOLD", 5),
            breaker_reset_timeout: Duration::from_secs(env_or("BREAKER_RESET_TIMEOUT_SECS", 60)),
        }
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            rate_limit_delay: self.rate_limit_delay,
            backoff: BackoffConfig {
                max_attempts: self.retry_max_attempts,
                base_wait: self.retry_base_wait,
                jitter: self.retry_jitter,
            },
            breaker: CircuitBreakerConfig {
                failure_threshold: self.breaker_failure_threshold,
                reset_timeout: self.breaker_reset_timeout,
            },
        }
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("./checkpoints"),
            rate_limit_delay: Duration::from_secs(1),
            retry_max_attempts: 5,
            retry_base_wait: Duration::from_secs(2),
            retry_jitter: 0.3,
            breaker_failure_threshold: 5,
            breaker_reset_timeout: Duration::from_secs(60),
        }
    }
}
