pub mod batch;
pub mod config;
pub mod failures;
pub mod fetch;
pub mod logging;
pub mod portfolios;
pub mod requests;
pub mod resilience;
pub mod storage;
pub mod types;

pub use batch::{BatchConfig, BatchError, BatchProcessor, BatchStats};
pub use config::{ApiSettings, BatchSettings, ConfigError};
pub use failures::{FailureLedger, FailureRecord, FailureStatistics, FailureType};
pub use fetch::{
    client::ApiClient, mock::MockReportFetcher, report_filename, FetchError, ReportFetcher,
};
pub use logging::init_logging;
pub use portfolios::{
    FilePortfolioDirectory, PortfolioDirectory, PortfolioError, StaticPortfolioDirectory,
};
pub use requests::{
    BankStatementRequest, DailyReportRequest, ProfitabilityRequest, ReportRequest,
    RequestValidationError, SyntheticProfitabilityRequest,
};
pub use resilience::{
    retry_with_backoff, BackoffConfig, BreakerError, CircuitBreaker, CircuitBreakerConfig,
    CircuitBreakerRegistry, CircuitBreakerStats, RetryError,
};
pub use storage::{FileReportSink, ReportSink};
pub use types::{Portfolio, Report, ReportContent, ReportFormat};
