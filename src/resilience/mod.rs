pub mod backoff;
pub mod circuit_breaker;

pub use backoff::{retry_with_backoff, BackoffConfig, RetryError};
pub use circuit_breaker::{
    BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry,
    CircuitBreakerStats,
};
