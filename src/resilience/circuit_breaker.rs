use log::{error, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Breaker thresholds shared by every breaker in a registry
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the breaker open
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing a trial call
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure_time: Option<Instant>,
    is_open: bool,
    total_calls: u64,
    successful_calls: u64,
    failed_calls: u64,
}

/// Snapshot of one breaker's counters.
/// `total_calls` only counts calls actually dispatched to the wrapped
/// operation; rejections while open are not in it.
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub is_open: bool,
    pub failure_count: u32,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub success_rate: f64,
    pub time_since_last_failure: Option<Duration>,
}

/// Error surface of a breaker-wrapped call: either the breaker rejected the
/// call while open, or the wrapped operation itself failed.
#[derive(Debug)]
pub enum BreakerError<E> {
    Open { name: String, retry_in: Duration },
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open_rejection(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    /// The wrapped operation's error, if the call was dispatched at all
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Open { .. } => None,
            BreakerError::Inner(e) => Some(e),
        }
    }
}

impl<E: fmt::Display> fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::Open { name, retry_in } => write!(
                f,
                "circuit breaker \"{}\" open, retry in {:.1}s",
                name,
                retry_in.as_secs_f64()
            ),
            BreakerError::Inner(e) => e.fmt(f),
        }
    }
}

impl<E: fmt::Display + fmt::Debug> std::error::Error for BreakerError<E> {}

/// Circuit breaker for one named operation category.
///
/// Closed until `failure_threshold` consecutive failures, then open:
/// calls are rejected without dispatching until `reset_timeout` has elapsed
/// since the last failure. The first call after that is allowed through
/// (half-open); success confirms closed, failure re-opens.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dispatch `operation` through the breaker, counting every error
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.call_excluding(operation, |_: &E| false).await
    }

    /// Like [`CircuitBreaker::call`], but errors matching `excluded` pass
    /// through without touching the failure count (nor the success count).
    pub async fn call_excluding<T, E, F, Fut, X>(
        &self,
        operation: F,
        excluded: X,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        X: Fn(&E) -> bool,
        E: fmt::Display,
    {
        {
            let mut state = self.state.lock().await;

            if state.is_open {
                let elapsed = state
                    .last_failure_time
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);

                if elapsed >= self.config.reset_timeout {
                    // half-open: unlock for one trial call
                    info!(
                        "Circuit breaker \"{}\" half-open after {:.1}s",
                        self.name,
                        elapsed.as_secs_f64()
                    );
                    state.is_open = false;
                } else {
                    let retry_in = self.config.reset_timeout - elapsed;
                    warn!(
                        "Circuit breaker \"{}\" open - rejecting call, retry in {:.1}s",
                        self.name,
                        retry_in.as_secs_f64()
                    );
                    return Err(BreakerError::Open {
                        name: self.name.clone(),
                        retry_in,
                    });
                }
            }

            state.total_calls += 1;
        }

        match operation().await {
            Ok(value) => {
                let mut state = self.state.lock().await;
                state.failure_count = 0;
                state.successful_calls += 1;
                Ok(value)
            }
            Err(e) => {
                if excluded(&e) {
                    return Err(BreakerError::Inner(e));
                }

                let mut state = self.state.lock().await;
                state.failure_count += 1;
                state.failed_calls += 1;
                state.last_failure_time = Some(Instant::now());

                if !state.is_open && state.failure_count >= self.config.failure_threshold {
                    state.is_open = true;
                    error!(
                        "Circuit breaker \"{}\" opened after {} consecutive failures. Last error: {}",
                        self.name, state.failure_count, e
                    );
                } else {
                    warn!(
                        "Failure on circuit breaker \"{}\" ({}/{}): {}",
                        self.name, state.failure_count, self.config.failure_threshold, e
                    );
                }

                Err(BreakerError::Inner(e))
            }
        }
    }

    pub async fn stats(&self) -> CircuitBreakerStats {
        let state = self.state.lock().await;
        let success_rate = if state.total_calls > 0 {
            state.successful_calls as f64 / state.total_calls as f64 * 100.0
        } else {
            0.0
        };

        CircuitBreakerStats {
            name: self.name.clone(),
            is_open: state.is_open,
            failure_count: state.failure_count,
            total_calls: state.total_calls,
            successful_calls: state.successful_calls,
            failed_calls: state.failed_calls,
            success_rate,
            time_since_last_failure: state.last_failure_time.map(|t| t.elapsed()),
        }
    }

    /// Force the breaker back to closed with a clean failure count
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.is_open = false;
        state.failure_count = 0;
        info!("Circuit breaker \"{}\" was manually reset", self.name);
    }
}

/// Explicit registry of breakers keyed by operation category name.
/// Owned by the orchestrator; nothing here is process-global.
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: HashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: HashMap::new(),
        }
    }

    /// Fetch the breaker for `name`, creating it lazily on first use
    pub fn get_or_create(&mut self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config.clone())))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).cloned()
    }

    pub async fn stats(&self, name: &str) -> Option<CircuitBreakerStats> {
        match self.breakers.get(name) {
            Some(breaker) => Some(breaker.stats().await),
            None => None,
        }
    }

    /// Reset a breaker by name; false when it was never created
    pub async fn reset(&self, name: &str) -> bool {
        match self.breakers.get(name) {
            Some(breaker) => {
                breaker.reset().await;
                true
            }
            None => false,
        }
    }
}
