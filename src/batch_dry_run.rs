use chrono::NaiveDate;
use fund_reports::{
    init_logging, BatchConfig, BatchProcessor, FailureLedger, FetchError, FileReportSink,
    MockReportFetcher, Portfolio, ReportFormat, ReportRequest, StaticPortfolioDirectory,
    SyntheticProfitabilityRequest,
};
use log::info;
use std::sync::Arc;
use std::time::Duration;

fn print_summary(title: &str, stats: &fund_reports::BatchStats) {
    println!("\n=== {} ===", title);
    println!("  successes:       {}", stats.successful_count());
    println!("  failures:        {}", stats.failed_count());
    println!("  breaker skips:   {}", stats.circuit_breaker_count());
    println!("  success rate:    {:.1}%", stats.success_rate());
    println!("  elapsed:         {:.2}s", stats.processing_time_seconds());
    println!("  throughput:      {:.2} portfolios/s", stats.throughput());
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("info", None)?;

    info!("Starting batch dry run against the mock fetcher");

    let portfolios = vec![
        Portfolio::new("4478", "FUND ALPHA FIC FIM"),
        Portfolio::new("9901", "FUND BETA RF"),
        Portfolio::new("1200", "FUND GAMMA MULTIMERCADO"),
        Portfolio::new("3355", "FUND DELTA ACOES"),
    ];

    // scripted failures: 1200 times out twice then recovers, 3355 is down
    let fetcher = Arc::new(MockReportFetcher::new());
    fetcher
        .fail_times("1200", FetchError::Timeout("no response after 60s".into()), 2)
        .await;
    fetcher
        .fail_always(
            "3355",
            FetchError::Api {
                message: "internal error".into(),
                status_code: Some(500),
            },
        )
        .await;

    let base_dir = std::env::temp_dir().join("fund_reports_dry_run");
    let checkpoint_dir = base_dir.join("checkpoints");
    let output_dir = base_dir.join("output");
    std::fs::create_dir_all(&output_dir)?;

    let config = BatchConfig {
        rate_limit_delay: Duration::from_millis(100),
        backoff: fund_reports::BackoffConfig {
            max_attempts: 3,
            base_wait: Duration::from_millis(200),
            jitter: 0.3,
        },
        ..BatchConfig::default()
    };

    let mut processor = BatchProcessor::new(
        fetcher.clone(),
        Arc::new(FileReportSink),
        FailureLedger::new(&checkpoint_dir),
        config,
    );

    let template = ReportRequest::SyntheticProfitability(SyntheticProfitabilityRequest::new(
        None,
        NaiveDate::from_ymd_opt(2025, 4, 30).unwrap_or_default(),
        ReportFormat::CsvBr,
    ));

    let (reports, stats) = processor
        .process_portfolio_batch(&portfolios, &template, true, Some(&output_dir))
        .await?;

    print_summary("First pass", &stats);
    println!("  reports fetched: {}", reports.len());
    println!("  total fetch calls: {}", fetcher.total_calls());

    let ledger_stats = processor.ledger().get_failure_statistics();
    println!("\n=== Failure ledger ===");
    println!("  total:      {}", ledger_stats.total_failures);
    println!("  retryable:  {}", ledger_stats.retryable);
    println!("  abandoned:  {}", ledger_stats.abandoned);

    let report_path = checkpoint_dir.join("failure_report.csv");
    if processor.ledger().export_failure_report(&report_path) {
        println!("  exported:   {}", report_path.display());
    }

    // the retry pass finds nothing eligible yet: api_error waits 60s
    let directory = StaticPortfolioDirectory::new(portfolios);
    let (retried, retry_stats) = processor
        .process_failed_portfolios_retry(&directory, &template, false, None, None)
        .await?;

    print_summary("Retry pass", &retry_stats);
    println!("  reports recovered: {}", retried.len());

    Ok(())
}
