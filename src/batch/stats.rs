use std::collections::{HashMap, HashSet};
use std::time::Instant;
use uuid::Uuid;

use crate::failures::FailureType;

/// Per-run accumulator for batch processing outcomes.
///
/// Portfolio ids are kept in sets, so recording the same outcome twice for
/// one portfolio never double-counts.
#[derive(Debug, Clone)]
pub struct BatchStats {
    run_id: Uuid,
    successful_portfolios: HashSet<String>,
    failed_portfolios: HashSet<String>,
    circuit_breaker_portfolios: HashSet<String>,
    failures_by_type: HashMap<FailureType, usize>,
    start_time: Instant,
}

impl BatchStats {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            successful_portfolios: HashSet::new(),
            failed_portfolios: HashSet::new(),
            circuit_breaker_portfolios: HashSet::new(),
            failures_by_type: HashMap::new(),
            start_time: Instant::now(),
        }
    }

    /// Clear all counters and restart the clock, keeping the run id
    pub fn reset(&mut self) {
        self.successful_portfolios.clear();
        self.failed_portfolios.clear();
        self.circuit_breaker_portfolios.clear();
        self.failures_by_type.clear();
        self.start_time = Instant::now();
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn record_success(&mut self, portfolio_id: &str) {
        self.successful_portfolios.insert(portfolio_id.to_string());
    }

    pub fn record_failure(&mut self, portfolio_id: &str, failure_type: FailureType) {
        if self.failed_portfolios.insert(portfolio_id.to_string()) {
            *self.failures_by_type.entry(failure_type).or_insert(0) += 1;
        }
    }

    pub fn record_circuit_breaker(&mut self, portfolio_id: &str) {
        self.circuit_breaker_portfolios
            .insert(portfolio_id.to_string());
    }

    pub fn successful_count(&self) -> usize {
        self.successful_portfolios.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed_portfolios.len()
    }

    pub fn circuit_breaker_count(&self) -> usize {
        self.circuit_breaker_portfolios.len()
    }

    pub fn total_processed(&self) -> usize {
        self.successful_count() + self.failed_count() + self.circuit_breaker_count()
    }

    pub fn failures_by_type(&self) -> &HashMap<FailureType, usize> {
        &self.failures_by_type
    }

    /// Percentage of processed portfolios that succeeded; 0 when nothing ran
    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            return 0.0;
        }
        self.successful_count() as f64 / total as f64 * 100.0
    }

    pub fn processing_time_seconds(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// Portfolios per second over the run so far; 0 when no time has passed
    pub fn throughput(&self) -> f64 {
        let elapsed = self.processing_time_seconds();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_processed() as f64 / elapsed
    }
}

impl Default for BatchStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_is_idempotent_per_id() {
        let mut stats = BatchStats::new();
        stats.record_success("A");
        stats.record_success("A");
        stats.record_failure("B", FailureType::Timeout);
        stats.record_failure("B", FailureType::Timeout);
        stats.record_circuit_breaker("C");
        stats.record_circuit_breaker("C");

        assert_eq!(stats.successful_count(), 1);
        assert_eq!(stats.failed_count(), 1);
        assert_eq!(stats.circuit_breaker_count(), 1);
        assert_eq!(stats.total_processed(), 3);
        assert_eq!(stats.failures_by_type().get(&FailureType::Timeout), Some(&1));
    }

    #[test]
    fn test_success_rate() {
        let mut stats = BatchStats::new();
        assert_eq!(stats.success_rate(), 0.0);

        stats.record_success("A");
        stats.record_failure("B", FailureType::ApiError);
        assert_eq!(stats.success_rate(), 50.0);

        stats.record_success("C");
        stats.record_success("D");
        assert_eq!(stats.success_rate(), 75.0);
    }

    #[test]
    fn test_reset_clears_counters() {
        let mut stats = BatchStats::new();
        stats.record_success("A");
        stats.record_failure("B", FailureType::Unknown);

        stats.reset();
        assert_eq!(stats.total_processed(), 0);
        assert!(stats.failures_by_type().is_empty());
        assert_eq!(stats.success_rate(), 0.0);
    }
}
