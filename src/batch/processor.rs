use log::{error, info, warn};
use std::backtrace::Backtrace;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::batch::stats::BatchStats;
use crate::failures::FailureLedger;
use crate::fetch::{FetchError, ReportFetcher};
use crate::portfolios::PortfolioDirectory;
use crate::requests::{ReportRequest, RequestValidationError};
use crate::resilience::{
    retry_with_backoff, BackoffConfig, BreakerError, CircuitBreakerConfig, CircuitBreakerRegistry,
};
use crate::storage::ReportSink;
use crate::types::{Portfolio, Report};

/// Knobs for one batch processor instance
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Fixed sleep before every fetch attempt, serializing the batch
    pub rate_limit_delay: Duration,
    pub backoff: BackoffConfig,
    pub breaker: CircuitBreakerConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            rate_limit_delay: Duration::from_secs(1),
            backoff: BackoffConfig::default(),
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// A caller contract violation that aborts the whole batch.
/// Transient fetch failures never surface through this type.
#[derive(Debug)]
pub enum BatchError {
    InvalidTemplate(RequestValidationError),
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchError::InvalidTemplate(e) => write!(f, "invalid base request template: {}", e),
        }
    }
}

impl std::error::Error for BatchError {}

/// Drives report fetches across a fleet of portfolios with retry, circuit
/// breaking and durable failure bookkeeping.
///
/// Owns its collaborators explicitly (no global registries): the fetcher
/// seam, the persistence sink, the failure ledger and the breaker registry.
/// Processing is strictly sequential in input order.
pub struct BatchProcessor {
    fetcher: Arc<dyn ReportFetcher>,
    sink: Arc<dyn ReportSink>,
    ledger: FailureLedger,
    breakers: CircuitBreakerRegistry,
    config: BatchConfig,
}

impl BatchProcessor {
    pub fn new(
        fetcher: Arc<dyn ReportFetcher>,
        sink: Arc<dyn ReportSink>,
        ledger: FailureLedger,
        config: BatchConfig,
    ) -> Self {
        let breakers = CircuitBreakerRegistry::new(config.breaker.clone());
        Self {
            fetcher,
            sink,
            ledger,
            breakers,
            config,
        }
    }

    pub fn ledger(&self) -> &FailureLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut FailureLedger {
        &mut self.ledger
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    /// Process `portfolios` in order against `base_request`.
    ///
    /// Each portfolio gets a derived request (template with the portfolio
    /// substituted), dispatched through the endpoint's circuit breaker and
    /// the retry executor. Failures are classified and recorded in the
    /// ledger; successes clear any prior ledger entry and are optionally
    /// persisted. One portfolio's failure never aborts the batch.
    pub async fn process_portfolio_batch(
        &mut self,
        portfolios: &[Portfolio],
        base_request: &ReportRequest,
        save_individual: bool,
        output_dir: Option<&Path>,
    ) -> Result<(Vec<Report>, BatchStats), BatchError> {
        base_request.validate().map_err(BatchError::InvalidTemplate)?;

        let endpoint = base_request.endpoint();
        let mut stats = BatchStats::new();
        let mut successful_reports = Vec::new();

        info!(
            "Starting batch run {} over {} portfolios (endpoint {})",
            stats.run_id(),
            portfolios.len(),
            endpoint
        );

        // one breaker per report endpoint, shared across the process lifetime
        let breaker = self
            .breakers
            .get_or_create(&format!("report_fetch_{}", endpoint));

        let backoff = self.config.backoff.clone();
        let rate_limit_delay = self.config.rate_limit_delay;

        for (i, portfolio) in portfolios.iter().enumerate() {
            info!("Processing {}/{}: {}", i + 1, portfolios.len(), portfolio);

            let request = base_request.with_portfolio(portfolio.clone());
            let fetcher = self.fetcher.clone();

            let result = breaker
                .call(|| {
                    let request = request.clone();
                    let backoff = backoff.clone();
                    async move {
                        retry_with_backoff(&backoff, FetchError::is_retryable, || {
                            let request = request.clone();
                            let fetcher = fetcher.clone();
                            async move {
                                tokio::time::sleep(rate_limit_delay).await;
                                fetcher.fetch(&request).await
                            }
                        })
                        .await
                    }
                })
                .await;

            match result {
                Ok(report) => {
                    self.ledger.remove_success(&portfolio.id);
                    stats.record_success(&portfolio.id);
                    info!(
                        "Success: {} - endpoint {} - {:.2} MB",
                        portfolio,
                        endpoint,
                        report.size_mb()
                    );

                    if save_individual {
                        if let Some(dir) = output_dir {
                            if !self.sink.save(&report, dir) {
                                // persistence trouble does not fail the portfolio
                                warn!("Could not save report {}", report.filename);
                            }
                        }
                    }

                    successful_reports.push(report);
                }
                Err(BreakerError::Open { retry_in, .. }) => {
                    // protective skip, not a fetch failure: no ledger entry
                    warn!(
                        "Circuit breaker open - skipping {} (retry in {:.1}s)",
                        portfolio,
                        retry_in.as_secs_f64()
                    );
                    stats.record_circuit_breaker(&portfolio.id);
                }
                Err(BreakerError::Inner(retry_error)) => {
                    let fetch_error = retry_error.into_inner();
                    let failure_type = fetch_error.failure_type();
                    let message = fetch_error.to_string();

                    error!(
                        "Failure: {} - {}: {}",
                        portfolio.id, failure_type, message
                    );

                    self.ledger.record_failure(
                        &portfolio.id,
                        &portfolio.name,
                        failure_type,
                        &message,
                        request.endpoint(),
                        request.api_params(),
                        Some(Backtrace::force_capture().to_string()),
                    );
                    stats.record_failure(&portfolio.id, failure_type);
                }
            }
        }

        self.log_summary(&stats);
        info!(
            "Batch run {} done: {}/{} successes ({:.1}%) in {:.1}s",
            stats.run_id(),
            successful_reports.len(),
            portfolios.len(),
            stats.success_rate(),
            stats.processing_time_seconds()
        );

        Ok((successful_reports, stats))
    }

    /// Re-run the batch path over the ledger's retry-eligible portfolios.
    ///
    /// Retry is just a filtered re-invocation of
    /// [`BatchProcessor::process_portfolio_batch`], not a separate algorithm.
    /// Ledger entries whose portfolio id the directory no longer knows are
    /// skipped with a warning.
    pub async fn process_failed_portfolios_retry(
        &mut self,
        directory: &dyn PortfolioDirectory,
        base_request: &ReportRequest,
        save_individual: bool,
        output_dir: Option<&Path>,
        max_portfolios: Option<usize>,
    ) -> Result<(Vec<Report>, BatchStats), BatchError> {
        let mut retryable = self.ledger.get_retryable_portfolios();

        if retryable.is_empty() {
            info!("No failed portfolios ready for retry");
            return Ok((Vec::new(), BatchStats::new()));
        }

        if let Some(max) = max_portfolios {
            retryable.truncate(max);
        }

        info!("Reprocessing {} previously failed portfolios", retryable.len());

        let mut portfolios = Vec::new();
        for failure in &retryable {
            match directory.resolve(&failure.portfolio_id) {
                Ok(portfolio) => portfolios.push(portfolio),
                Err(e) => warn!("Portfolio {} not found: {}", failure.portfolio_id, e),
            }
        }

        self.process_portfolio_batch(&portfolios, base_request, save_individual, output_dir)
            .await
    }

    fn log_summary(&self, stats: &BatchStats) {
        info!("Batch summary:");
        info!("  successes: {}", stats.successful_count());
        info!("  failures: {}", stats.failed_count());
        info!("  circuit breaker skips: {}", stats.circuit_breaker_count());
        info!("  success rate: {:.1}%", stats.success_rate());
        info!("  throughput: {:.2} portfolios/s", stats.throughput());

        for (failure_type, count) in stats.failures_by_type() {
            info!("  failures[{}]: {}", failure_type, count);
        }

        let ledger_stats = self.ledger.get_failure_statistics();
        if ledger_stats.total_failures > 0 {
            info!(
                "Failure ledger: {} total, {} retryable, {} abandoned",
                ledger_stats.total_failures, ledger_stats.retryable, ledger_stats.abandoned
            );
        }
    }
}
