use async_trait::async_trait;
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::ApiSettings;
use crate::fetch::{report_filename, FetchError, ReportFetcher};
use crate::requests::ReportRequest;
use crate::types::{Report, ReportContent};

/// Sliding-window call limiter: at most `max_calls` within `period`
struct SlidingWindow {
    max_calls: usize,
    period: Duration,
    calls: Vec<Instant>,
}

impl SlidingWindow {
    fn new(max_calls: usize, period: Duration) -> Self {
        Self {
            max_calls,
            period,
            calls: Vec::new(),
        }
    }

    fn prune(&mut self) {
        if let Some(cutoff) = Instant::now().checked_sub(self.period) {
            self.calls.retain(|t| *t > cutoff);
        }
    }

    /// How long until the next call fits in the window, if at all
    fn wait_time(&mut self) -> Option<Duration> {
        self.prune();
        if self.calls.len() < self.max_calls {
            return None;
        }
        self.calls
            .iter()
            .min()
            .map(|oldest| (*oldest + self.period).saturating_duration_since(Instant::now()))
    }

    fn record(&mut self) {
        self.calls.push(Instant::now());
    }
}

/// HTTP client for the vendor report API.
///
/// POSTs report parameters to `{base_url}/relatorios/{endpoint}` with the
/// `apikey` header, throttled by a sliding-window rate limiter, and maps
/// every failure onto the [`FetchError`] taxonomy.
pub struct ApiClient {
    settings: ApiSettings,
    http: reqwest::Client,
    window: Mutex<SlidingWindow>,
}

impl ApiClient {
    pub fn new(settings: ApiSettings) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| FetchError::Other(format!("failed to build HTTP client: {}", e)))?;

        let window = Mutex::new(SlidingWindow::new(
            settings.rate_limit_calls,
            settings.rate_limit_period,
        ));

        Ok(Self {
            settings,
            http,
            window,
        })
    }

    async fn wait_for_slot(&self) {
        let wait = {
            let mut window = self.window.lock().await;
            window.wait_time()
        };
        if let Some(wait) = wait {
            debug!("Rate limit window full, waiting {:.1}s", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }
    }
}

#[async_trait]
impl ReportFetcher for ApiClient {
    async fn fetch(&self, request: &ReportRequest) -> Result<Report, FetchError> {
        self.wait_for_slot().await;

        let url = format!(
            "{}/relatorios/{}",
            self.settings.base_url.trim_end_matches('/'),
            request.endpoint()
        );
        let params = serde_json::Value::Object(request.api_params());

        debug!("POST {} for portfolio {:?}", url, request.portfolio().map(|p| &p.id));

        let response = self
            .http
            .post(&url)
            .header("apikey", &self.settings.api_key)
            .header("Accept", "application/json")
            .json(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(format!(
                        "no response after {}s: {}",
                        self.settings.timeout.as_secs(),
                        e
                    ))
                } else {
                    FetchError::Api {
                        message: format!("communication error: {}", e),
                        status_code: None,
                    }
                }
            })?;

        self.window.lock().await.record();

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(FetchError::Authentication("invalid credentials".into()))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(FetchError::RateLimit("rate limit exceeded".into()))
            }
            StatusCode::ACCEPTED => {
                return Err(FetchError::Processing(
                    "report generation still in progress".into(),
                ))
            }
            status if status.is_client_error() || status.is_server_error() => {
                let body = response.text().await.unwrap_or_default();
                return Err(FetchError::Api {
                    message: format!("API returned {}: {:.200}", status, body),
                    status_code: Some(status.as_u16()),
                });
            }
            _ => {}
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let bytes = response.bytes().await.map_err(|e| FetchError::Api {
            message: format!("failed to read response body: {}", e),
            status_code: None,
        })?;

        if bytes.is_empty() {
            return Err(FetchError::EmptyReport("vendor returned an empty body".into()));
        }

        let format = request.format();
        let content = if format.is_text() {
            ReportContent::Text(String::from_utf8_lossy(&bytes).into_owned())
        } else {
            ReportContent::Binary(bytes.to_vec())
        };

        Ok(Report::new(
            content,
            content_type,
            report_filename(request),
            request.portfolio().cloned(),
            request.date(),
            format,
        ))
    }
}
