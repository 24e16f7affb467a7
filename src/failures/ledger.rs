use chrono::{Local, TimeZone};
use log::{error, info, warn};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::failures::epoch_secs;
use crate::failures::record::{FailureRecord, FailureType};

const FAILURES_FILE_NAME: &str = "failed_portfolios.json";

/// Aggregate view over the current ledger contents
#[derive(Debug, Clone, PartialEq)]
pub struct FailureStatistics {
    pub total_failures: usize,
    pub by_type: HashMap<FailureType, usize>,
    /// Entries still under their retry ceiling
    pub retryable: usize,
    /// Entries that exhausted their retry ceiling
    pub abandoned: usize,
    pub oldest_failure_age_minutes: f64,
}

/// Durable record of the latest failure per portfolio.
///
/// Keyed by portfolio id, persisted write-through to a JSON checkpoint with
/// the previous file kept as a `.json.bak` backup before each overwrite.
/// Persistence is best-effort: disk trouble is logged, never raised, so a
/// full disk cannot take the batch down with it.
pub struct FailureLedger {
    failures_file: PathBuf,
    failures: HashMap<String, FailureRecord>,
}

impl FailureLedger {
    /// Open (or create) the ledger under `checkpoint_dir`.
    ///
    /// A missing checkpoint file means a clean start; a corrupt one is
    /// logged and treated as empty rather than aborting startup.
    pub fn new(checkpoint_dir: impl AsRef<Path>) -> Self {
        let checkpoint_dir = checkpoint_dir.as_ref();
        if let Err(e) = fs::create_dir_all(checkpoint_dir) {
            error!(
                "Failed to create checkpoint dir {}: {}",
                checkpoint_dir.display(),
                e
            );
        }

        let mut ledger = Self {
            failures_file: checkpoint_dir.join(FAILURES_FILE_NAME),
            failures: HashMap::new(),
        };
        ledger.load();
        ledger
    }

    fn load(&mut self) {
        if !self.failures_file.exists() {
            info!("No failure checkpoint found - starting clean");
            return;
        }

        match fs::read_to_string(&self.failures_file) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, FailureRecord>>(&raw) {
                Ok(failures) => {
                    info!("Loaded {} failures from checkpoint", failures.len());
                    self.failures = failures;
                }
                Err(e) => {
                    error!(
                        "Corrupt failure checkpoint {}: {} - starting empty",
                        self.failures_file.display(),
                        e
                    );
                }
            },
            Err(e) => {
                error!(
                    "Failed to read failure checkpoint {}: {} - starting empty",
                    self.failures_file.display(),
                    e
                );
            }
        }
    }

    /// Write-through persist: rename the current file to `.json.bak`, then
    /// write the full ledger. Errors are logged and swallowed.
    fn save(&self) {
        if self.failures_file.exists() {
            let backup = self.failures_file.with_extension("json.bak");
            if let Err(e) = fs::rename(&self.failures_file, &backup) {
                error!("Failed to back up failure checkpoint: {}", e);
            }
        }

        match serde_json::to_string_pretty(&self.failures) {
            Ok(json) => {
                if let Err(e) = fs::write(&self.failures_file, json) {
                    error!(
                        "Failed to persist {} failures to checkpoint: {}",
                        self.failures.len(),
                        e
                    );
                }
            }
            Err(e) => error!("Failed to serialize failure checkpoint: {}", e),
        }
    }

    /// Upsert the failure record for a portfolio.
    ///
    /// An existing record is replaced, carrying the attempt count forward:
    /// the new record's `attempt_count` is the old one plus one.
    #[allow(clippy::too_many_arguments)]
    pub fn record_failure(
        &mut self,
        portfolio_id: &str,
        portfolio_name: &str,
        failure_type: FailureType,
        error_message: &str,
        endpoint: &str,
        request_params: Map<String, Value>,
        stack_trace: Option<String>,
    ) {
        let attempt_count = self
            .failures
            .get(portfolio_id)
            .map(|existing| existing.attempt_count + 1)
            .unwrap_or(1);

        let record = FailureRecord {
            portfolio_id: portfolio_id.to_string(),
            portfolio_name: portfolio_name.to_string(),
            failure_type,
            error_message: error_message.to_string(),
            timestamp: epoch_secs(),
            attempt_count,
            endpoint: endpoint.to_string(),
            request_params,
            stack_trace,
        };

        self.failures.insert(portfolio_id.to_string(), record);
        self.save();

        warn!(
            "Failure recorded: {} ({}) - {} - attempt {}",
            portfolio_id, portfolio_name, failure_type, attempt_count
        );
    }

    /// Clear a portfolio from the ledger after a successful fetch.
    /// A no-op when the portfolio has no record.
    pub fn remove_success(&mut self, portfolio_id: &str) {
        if let Some(record) = self.failures.remove(portfolio_id) {
            self.save();
            info!(
                "Success: {} cleared from failures after {} attempts",
                portfolio_id, record.attempt_count
            );
        }
    }

    /// Entries that are still under their retry ceiling AND whose
    /// type-specific delay has elapsed, least-tried first. The ascending
    /// order pushes chronic failures to the back of a retry batch.
    pub fn get_retryable_portfolios(&self) -> Vec<FailureRecord> {
        let now = epoch_secs();
        let mut retryable: Vec<FailureRecord> = self
            .failures
            .values()
            .filter(|f| f.should_retry() && (now - f.timestamp) >= f.retry_delay_seconds())
            .cloned()
            .collect();

        retryable.sort_by_key(|f| f.attempt_count);

        info!("Found {} portfolios ready for retry", retryable.len());
        retryable
    }

    pub fn get_failure_statistics(&self) -> FailureStatistics {
        let mut by_type: HashMap<FailureType, usize> = HashMap::new();
        let mut retryable = 0;
        let mut abandoned = 0;
        let mut oldest_age: f64 = 0.0;

        for failure in self.failures.values() {
            *by_type.entry(failure.failure_type).or_insert(0) += 1;
            if failure.should_retry() {
                retryable += 1;
            } else {
                abandoned += 1;
            }
            oldest_age = oldest_age.max(failure.age_minutes());
        }

        FailureStatistics {
            total_failures: self.failures.len(),
            by_type,
            retryable,
            abandoned,
            oldest_failure_age_minutes: oldest_age,
        }
    }

    /// Ids of every portfolio currently in a failed state
    pub fn failed_portfolio_ids(&self) -> HashSet<String> {
        self.failures.keys().cloned().collect()
    }

    pub fn get_failure(&self, portfolio_id: &str) -> Option<&FailureRecord> {
        self.failures.get(portfolio_id)
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Drop entries older than `max_age_hours`, regardless of retry
    /// eligibility. Returns how many were removed.
    pub fn clear_old_failures(&mut self, max_age_hours: u64) -> usize {
        let now = epoch_secs();
        let max_age_seconds = (max_age_hours * 3600) as f64;

        let old: Vec<String> = self
            .failures
            .iter()
            .filter(|(_, f)| (now - f.timestamp) > max_age_seconds)
            .map(|(id, _)| id.clone())
            .collect();

        for portfolio_id in &old {
            self.failures.remove(portfolio_id);
        }

        if !old.is_empty() {
            self.save();
            info!("Removed {} old failures (>{}h)", old.len(), max_age_hours);
        }

        old.len()
    }

    /// Export the current ledger as CSV, one row per record.
    /// Returns false instead of raising on I/O trouble.
    pub fn export_failure_report(&self, output_file: &Path) -> bool {
        let mut writer = match csv::Writer::from_path(output_file) {
            Ok(writer) => writer,
            Err(e) => {
                error!(
                    "Failed to open failure report {}: {}",
                    output_file.display(),
                    e
                );
                return false;
            }
        };

        let header = [
            "portfolio_id",
            "portfolio_name",
            "failure_type",
            "error_message",
            "timestamp",
            "attempt_count",
            "endpoint",
            "age_minutes",
            "should_retry",
            "retry_delay_seconds",
        ];
        if let Err(e) = writer.write_record(header) {
            error!("Failed to write failure report header: {}", e);
            return false;
        }

        for failure in self.failures.values() {
            let timestamp = Local
                .timestamp_opt(failure.timestamp as i64, 0)
                .single()
                .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
                .unwrap_or_else(|| failure.timestamp.to_string());

            let row = [
                failure.portfolio_id.clone(),
                failure.portfolio_name.clone(),
                failure.failure_type.to_string(),
                failure.error_message.clone(),
                timestamp,
                failure.attempt_count.to_string(),
                failure.endpoint.clone(),
                format!("{:.1}", failure.age_minutes()),
                failure.should_retry().to_string(),
                format!("{:.1}", failure.retry_delay_seconds()),
            ];
            if let Err(e) = writer.write_record(&row) {
                error!("Failed to write failure report row: {}", e);
                return false;
            }
        }

        if let Err(e) = writer.flush() {
            error!("Failed to flush failure report: {}", e);
            return false;
        }

        info!("Failure report exported to {}", output_file.display());
        true
    }
}
