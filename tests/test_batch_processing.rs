use chrono::NaiveDate;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use fund_reports::{
    BackoffConfig, BatchConfig, BatchProcessor, CircuitBreakerConfig, FailureLedger,
    FailureType, FetchError, FileReportSink, MockReportFetcher, Portfolio, ReportFormat,
    ReportRequest, StaticPortfolioDirectory, SyntheticProfitabilityRequest,
};

fn template() -> ReportRequest {
    ReportRequest::SyntheticProfitability(SyntheticProfitabilityRequest::new(
        None,
        NaiveDate::from_ymd_opt(2025, 4, 30).unwrap(),
        ReportFormat::CsvBr,
    ))
}

/// Fast timings: 3 retry attempts, millisecond waits, breaker wide open
fn fast_config() -> BatchConfig {
    BatchConfig {
        rate_limit_delay: Duration::from_millis(1),
        backoff: BackoffConfig {
            max_attempts: 3,
            base_wait: Duration::from_millis(2),
            jitter: 0.3,
        },
        breaker: CircuitBreakerConfig {
            failure_threshold: 100,
            reset_timeout: Duration::from_secs(60),
        },
    }
}

fn build_processor(fetcher: Arc<MockReportFetcher>, checkpoint_dir: &Path) -> BatchProcessor {
    BatchProcessor::new(
        fetcher,
        Arc::new(FileReportSink),
        FailureLedger::new(checkpoint_dir),
        fast_config(),
    )
}

/// Backdate every checkpoint record by `secs` and reload the ledger from disk
fn backdate_checkpoint(checkpoint_dir: &Path, secs: f64) {
    let path = checkpoint_dir.join("failed_portfolios.json");
    let raw = std::fs::read_to_string(&path).unwrap();
    let mut data: serde_json::Value = serde_json::from_str(&raw).unwrap();
    for (_, record) in data.as_object_mut().unwrap() {
        let ts = record["timestamp"].as_f64().unwrap();
        record["timestamp"] = serde_json::json!(ts - secs);
    }
    std::fs::write(&path, serde_json::to_string_pretty(&data).unwrap()).unwrap();
}

#[tokio::test]
async fn test_one_failing_portfolio_never_aborts_the_batch() {
    let checkpoints = TempDir::new().unwrap();
    let fetcher = Arc::new(MockReportFetcher::new());
    fetcher
        .fail_always("P3", FetchError::Timeout("no response after 60s".into()))
        .await;

    let portfolios: Vec<Portfolio> = (1..=5)
        .map(|n| Portfolio::new(format!("P{}", n), format!("FUND {}", n)))
        .collect();

    let mut processor = build_processor(fetcher, checkpoints.path());
    let (reports, stats) = processor
        .process_portfolio_batch(&portfolios, &template(), false, None)
        .await
        .unwrap();

    assert_eq!(reports.len(), 4);
    assert_eq!(stats.successful_count(), 4);
    assert_eq!(stats.failed_count(), 1);
    assert_eq!(stats.circuit_breaker_count(), 0);

    assert_eq!(processor.ledger().len(), 1);
    let record = processor.ledger().get_failure("P3").unwrap();
    assert_eq!(record.failure_type, FailureType::Timeout);
    assert_eq!(record.endpoint, "1048");
}

#[tokio::test]
async fn test_saved_reports_land_in_output_dir() {
    let checkpoints = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let fetcher = Arc::new(MockReportFetcher::new());

    let mut processor = build_processor(fetcher, checkpoints.path());
    let (reports, _) = processor
        .process_portfolio_batch(
            &[Portfolio::new("4478", "FUND ALPHA")],
            &template(),
            true,
            Some(output.path()),
        )
        .await
        .unwrap();

    assert_eq!(reports.len(), 1);
    assert!(output.path().join(&reports[0].filename).exists());
}

#[tokio::test]
async fn test_batch_then_retry_end_to_end() {
    let checkpoints = TempDir::new().unwrap();
    let fetcher = Arc::new(MockReportFetcher::new());
    fetcher
        .fail_always(
            "B",
            FetchError::Api {
                message: "internal error".into(),
                status_code: Some(500),
            },
        )
        .await;

    let portfolios = vec![Portfolio::new("A", "FUND A"), Portfolio::new("B", "FUND B")];
    let directory = StaticPortfolioDirectory::new(portfolios.clone());

    // first pass: A succeeds, B exhausts the 3-attempt retry executor
    let mut processor = build_processor(fetcher.clone(), checkpoints.path());
    let (reports, stats) = processor
        .process_portfolio_batch(&portfolios, &template(), false, None)
        .await
        .unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].portfolio.as_ref().unwrap().id, "A");
    assert_eq!(stats.success_rate(), 50.0);
    assert_eq!(fetcher.calls_for("B").await, 3);

    let record = processor.ledger().get_failure("B").unwrap();
    assert_eq!(record.attempt_count, 1);
    assert_eq!(record.failure_type, FailureType::ApiError);

    // immediate retry: the 60s api_error delay has not elapsed
    let (retried, retry_stats) = processor
        .process_failed_portfolios_retry(&directory, &template(), false, None, None)
        .await
        .unwrap();
    assert!(retried.is_empty());
    assert_eq!(retry_stats.total_processed(), 0);
    assert_eq!(fetcher.calls_for("B").await, 3);

    // simulate >60s passing, reload the ledger from its checkpoint, fix B
    drop(processor);
    backdate_checkpoint(checkpoints.path(), 61.0);
    fetcher.clear_outcome("B").await;

    let mut processor = build_processor(fetcher.clone(), checkpoints.path());
    let (recovered, retry_stats) = processor
        .process_failed_portfolios_retry(&directory, &template(), false, None, None)
        .await
        .unwrap();

    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].portfolio.as_ref().unwrap().id, "B");
    assert_eq!(retry_stats.successful_count(), 1);
    assert!(processor.ledger().is_empty());
}

#[tokio::test]
async fn test_retry_respects_max_portfolios_cap() {
    let checkpoints = TempDir::new().unwrap();
    let fetcher = Arc::new(MockReportFetcher::new());
    for id in ["A", "B", "C"] {
        fetcher
            .fail_always(id, FetchError::Timeout("down".into()))
            .await;
    }

    let portfolios = vec![
        Portfolio::new("A", "FUND A"),
        Portfolio::new("B", "FUND B"),
        Portfolio::new("C", "FUND C"),
    ];
    let directory = StaticPortfolioDirectory::new(portfolios.clone());

    let mut processor = build_processor(fetcher.clone(), checkpoints.path());
    processor
        .process_portfolio_batch(&portfolios, &template(), false, None)
        .await
        .unwrap();
    assert_eq!(processor.ledger().len(), 3);

    drop(processor);
    backdate_checkpoint(checkpoints.path(), 3600.0);
    for id in ["A", "B", "C"] {
        fetcher.clear_outcome(id).await;
    }

    let mut processor = build_processor(fetcher, checkpoints.path());
    let (recovered, _) = processor
        .process_failed_portfolios_retry(&directory, &template(), false, None, Some(2))
        .await
        .unwrap();

    assert_eq!(recovered.len(), 2);
    assert_eq!(processor.ledger().len(), 1);
}

#[tokio::test]
async fn test_unknown_ledger_ids_are_skipped_on_retry() {
    let checkpoints = TempDir::new().unwrap();
    let fetcher = Arc::new(MockReportFetcher::new());
    fetcher
        .fail_always("GONE", FetchError::Timeout("down".into()))
        .await;

    let mut processor = build_processor(fetcher.clone(), checkpoints.path());
    processor
        .process_portfolio_batch(
            &[Portfolio::new("GONE", "DELISTED FUND")],
            &template(),
            false,
            None,
        )
        .await
        .unwrap();

    drop(processor);
    backdate_checkpoint(checkpoints.path(), 3600.0);

    // the directory no longer knows this portfolio
    let directory = StaticPortfolioDirectory::new(Vec::<Portfolio>::new());
    let mut processor = build_processor(fetcher.clone(), checkpoints.path());
    let (recovered, stats) = processor
        .process_failed_portfolios_retry(&directory, &template(), false, None, None)
        .await
        .unwrap();

    assert!(recovered.is_empty());
    assert_eq!(stats.total_processed(), 0);
    assert_eq!(fetcher.calls_for("GONE").await, 3);
}
