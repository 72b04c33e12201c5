use std::time::Duration;

use archiver_logging::{archive_debug, archive_warn};
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;

use crate::throttle::{BackoffSchedule, RateLimiter};
use crate::{FailureKind, FetchError, FetchOutput};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub user_agent: Option<String>,
    /// Minimum spacing between two requests.
    pub base_delay: Duration,
    /// Waits applied to consecutive 429 responses of one request.
    pub backoff: Vec<Duration>,
    /// Retries for timeouts, connection errors and 5xx.
    pub max_retries: usize,
    pub retry_delay: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 25 * 1024 * 1024,
            user_agent: None,
            base_delay: Duration::from_secs(3),
            backoff: vec![Duration::from_secs(60), Duration::from_secs(120)],
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// A single GET with no retry or pacing logic.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchOutput, FetchError>;
}

/// What the rest of the pipeline uses to obtain bytes.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    max_bytes: u64,
}

impl ReqwestTransport {
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit));
        if let Some(agent) = settings.user_agent.as_deref() {
            builder = builder.user_agent(agent);
        }
        let client = builder
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self {
            client,
            max_bytes: settings.max_bytes,
        })
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<FetchOutput, FetchError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                return Err(FetchError::new(FailureKind::NotFound, status.to_string()));
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(FetchError::new(FailureKind::RateLimited, status.to_string()));
            }
            _ if !status.is_success() => {
                return Err(FetchError::new(
                    FailureKind::HttpStatus(status.as_u16()),
                    status.to_string(),
                ));
            }
            _ => {}
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes: self.max_bytes,
                        actual: Some(content_len),
                    },
                    "response too large",
                ));
            }
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > self.max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes: self.max_bytes,
                        actual: Some(next_len),
                    },
                    "response too large",
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchOutput {
            bytes,
            content_type,
            final_url,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}

/// Paces every request through one shared [`RateLimiter`] and applies the
/// retry policy: 429 walks the backoff schedule, transient errors get a
/// bounded number of fixed-delay retries, everything else surfaces at once.
pub struct ThrottledFetcher<T> {
    transport: T,
    limiter: RateLimiter,
    backoff: BackoffSchedule,
    max_retries: usize,
    retry_delay: Duration,
}

impl ThrottledFetcher<ReqwestTransport> {
    pub fn from_settings(settings: &FetchSettings) -> Result<Self, FetchError> {
        Ok(Self::new(ReqwestTransport::new(settings)?, settings))
    }
}

impl<T: Transport> ThrottledFetcher<T> {
    pub fn new(transport: T, settings: &FetchSettings) -> Self {
        Self {
            transport,
            limiter: RateLimiter::new(settings.base_delay),
            backoff: BackoffSchedule::new(settings.backoff.clone()),
            max_retries: settings.max_retries,
            retry_delay: settings.retry_delay,
        }
    }
}

#[async_trait::async_trait]
impl<T: Transport> Fetcher for ThrottledFetcher<T> {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError> {
        let mut rate_limited = 0usize;
        let mut transient = 0usize;
        loop {
            self.limiter.acquire().await;
            let err = match self.transport.get(url).await {
                Ok(output) => return Ok(output),
                Err(err) => err,
            };

            match err.kind {
                FailureKind::RateLimited => match self.backoff.delay_for(rate_limited) {
                    Some(wait) => {
                        rate_limited += 1;
                        archive_warn!("rate limited on {url}; backing off {}s", wait.as_secs());
                        self.limiter.pause_for(wait).await;
                    }
                    None => {
                        archive_warn!("still rate limited on {url} after {rate_limited} backoffs");
                        return Err(err);
                    }
                },
                ref kind if kind.is_transient() && transient < self.max_retries => {
                    // Only back-to-back 429s walk the schedule.
                    rate_limited = 0;
                    transient += 1;
                    archive_debug!(
                        "transient failure on {url} ({err}); retry {transient}/{}",
                        self.max_retries
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                _ => return Err(err),
            }
        }
    }
}
