//! HTTP fetcher with a deterministic retry ladder.
//!
//! 200 returns, 429 honours `Retry-After` (base delay otherwise), 5xx and
//! timeouts wait the base delay, any other 4xx fails fast. The budget is
//! `max_retries` sleeps; exhaustion surfaces as a `Network` error.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER, USER_AGENT};
use serde::Serialize;
use tracing::{info, warn};

use ridecal_common::{Config, IngestError, Result};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One outbound request. Form pairs may repeat keys (`season[]`, `country[]`).
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub form: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            form: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            form,
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// What to do with a completed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// 200 — hand the body back.
    Success,
    /// Sleep this long, then try again.
    Retry(Duration),
    /// Non-retryable; fail the request now.
    Fail(String),
}

/// Pure classification of a response status against the retry policy.
pub fn classify(status: u16, retry_after: Option<u64>, base_delay: Duration) -> RetryDecision {
    match status {
        200 => RetryDecision::Success,
        429 => RetryDecision::Retry(
            retry_after.map(Duration::from_secs).unwrap_or(base_delay),
        ),
        s if s >= 500 => RetryDecision::Retry(base_delay),
        s => RetryDecision::Fail(format!("HTTP {s}")),
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct FetcherCounters {
    pub requests: u32,
    pub errors: u32,
    pub retries: u32,
}

pub struct Fetcher {
    client: reqwest::Client,
    max_retries: u32,
    retry_delay: Duration,
    pub counters: FetcherCounters,
}

impl Fetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout_duration())
            .default_headers(headers)
            .build()
            .map_err(|e| IngestError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay_duration(),
            counters: FetcherCounters::default(),
        })
    }

    /// Execute a request under the retry policy. Cancellation aborts
    /// between attempts without a retry.
    pub async fn fetch(&mut self, request: &FetchRequest, cancelled: &AtomicBool) -> Result<String> {
        let mut retries_used: u32 = 0;

        loop {
            if cancelled.load(Ordering::Relaxed) {
                return Err(IngestError::Cancelled);
            }

            self.counters.requests += 1;
            match self.attempt(request).await {
                Ok((status, retry_after, body)) => {
                    match classify(status, retry_after, self.retry_delay) {
                        RetryDecision::Success => return Ok(body),
                        RetryDecision::Retry(delay) => {
                            if retries_used >= self.max_retries {
                                self.counters.errors += 1;
                                return Err(IngestError::Network(format!(
                                    "max retries ({}) exceeded for {} (last status {status})",
                                    self.max_retries, request.url
                                )));
                            }
                            warn!(
                                url = %request.url,
                                status,
                                delay_secs = delay.as_secs(),
                                "Retryable response, backing off"
                            );
                            tokio::time::sleep(delay).await;
                            retries_used += 1;
                            self.counters.retries += 1;
                        }
                        RetryDecision::Fail(reason) => {
                            self.counters.errors += 1;
                            return Err(IngestError::Network(format!(
                                "{reason} for {}",
                                request.url
                            )));
                        }
                    }
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    if retries_used >= self.max_retries {
                        self.counters.errors += 1;
                        return Err(IngestError::Network(format!(
                            "max retries ({}) exceeded for {}: {e}",
                            self.max_retries, request.url
                        )));
                    }
                    warn!(url = %request.url, error = %e, "Request failed, backing off");
                    tokio::time::sleep(self.retry_delay).await;
                    retries_used += 1;
                    self.counters.retries += 1;
                }
                Err(e) => {
                    self.counters.errors += 1;
                    return Err(IngestError::Network(format!(
                        "request error for {}: {e}",
                        request.url
                    )));
                }
            }
        }
    }

    /// One HTTP attempt. Returns (status, Retry-After seconds, body).
    async fn attempt(
        &self,
        request: &FetchRequest,
    ) -> std::result::Result<(u16, Option<u64>, String), reqwest::Error> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url).form(&request.form),
        };

        for (name, value) in &request.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_str(name),
                HeaderValue::from_str(value),
            ) {
                builder = builder.header(name, value);
            }
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = response.text().await?;

        if status == 200 {
            info!(url = %request.url, bytes = body.len(), "Fetched");
        }

        Ok((status, retry_after, body))
    }
}
