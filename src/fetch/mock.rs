use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::fetch::{FetchError, ReportFetcher};
use crate::requests::ReportRequest;
use crate::types::{Report, ReportContent};

#[derive(Debug, Clone)]
struct ScriptedOutcome {
    error: FetchError,
    /// None = fail forever; Some(n) = fail n more times, then succeed
    remaining: Option<u32>,
}

/// Scripted fetcher for tests and dry runs.
///
/// Every portfolio succeeds unless an outcome was scripted for its id.
/// Call counts are tracked per portfolio and in total.
pub struct MockReportFetcher {
    outcomes: Arc<RwLock<HashMap<String, ScriptedOutcome>>>,
    calls: Arc<RwLock<HashMap<String, u32>>>,
    total_calls: AtomicU32,
}

impl MockReportFetcher {
    pub fn new() -> Self {
        Self {
            outcomes: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(HashMap::new())),
            total_calls: AtomicU32::new(0),
        }
    }

    /// Every fetch for `portfolio_id` fails with a clone of `error`
    pub async fn fail_always(&self, portfolio_id: &str, error: FetchError) {
        let mut outcomes = self.outcomes.write().await;
        outcomes.insert(
            portfolio_id.to_string(),
            ScriptedOutcome {
                error,
                remaining: None,
            },
        );
    }

    /// The next `times` fetches for `portfolio_id` fail, then it succeeds
    pub async fn fail_times(&self, portfolio_id: &str, error: FetchError, times: u32) {
        let mut outcomes = self.outcomes.write().await;
        outcomes.insert(
            portfolio_id.to_string(),
            ScriptedOutcome {
                error,
                remaining: Some(times),
            },
        );
    }

    /// Drop any scripted outcome so the portfolio succeeds again
    pub async fn clear_outcome(&self, portfolio_id: &str) {
        let mut outcomes = self.outcomes.write().await;
        outcomes.remove(portfolio_id);
    }

    pub fn total_calls(&self) -> u32 {
        self.total_calls.load(Ordering::SeqCst)
    }

    pub async fn calls_for(&self, portfolio_id: &str) -> u32 {
        let calls = self.calls.read().await;
        calls.get(portfolio_id).copied().unwrap_or(0)
    }
}

impl Default for MockReportFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReportFetcher for MockReportFetcher {
    async fn fetch(&self, request: &ReportRequest) -> Result<Report, FetchError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);

        let portfolio_id = request
            .portfolio()
            .map(|p| p.id.clone())
            .unwrap_or_default();

        {
            let mut calls = self.calls.write().await;
            *calls.entry(portfolio_id.clone()).or_insert(0) += 1;
        }

        {
            let mut outcomes = self.outcomes.write().await;
            if let Some(outcome) = outcomes.get_mut(&portfolio_id) {
                match &mut outcome.remaining {
                    None => return Err(outcome.error.clone()),
                    Some(0) => {}
                    Some(n) => {
                        *n -= 1;
                        return Err(outcome.error.clone());
                    }
                }
            }
        }

        let content = ReportContent::Text(format!(
            "mock report;endpoint={};portfolio={}\n",
            request.endpoint(),
            portfolio_id
        ));
        Ok(Report::new(
            content,
            "text/plain".to_string(),
            super::report_filename(request),
            request.portfolio().cloned(),
            request.date(),
            request.format(),
        ))
    }
}
