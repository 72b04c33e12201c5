use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use archiver_engine::{
    FailureKind, FetchError, FetchOutput, FetchSettings, Fetcher, ThrottledFetcher, Transport,
};
use tokio::time::Instant;

/// Replays a fixed list of responses and records when each request was made.
#[derive(Clone, Default)]
struct Scripted {
    responses: Arc<Mutex<VecDeque<Result<FetchOutput, FetchError>>>>,
    calls: Arc<Mutex<Vec<Instant>>>,
}

impl Scripted {
    fn new(responses: Vec<Result<FetchOutput, FetchError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            calls: Arc::default(),
        }
    }

    fn calls(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Transport for Scripted {
    async fn get(&self, url: &str) -> Result<FetchOutput, FetchError> {
        self.calls.lock().unwrap().push(Instant::now());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ok(url)))
    }
}

fn ok(url: &str) -> FetchOutput {
    FetchOutput {
        bytes: b"body".to_vec(),
        content_type: None,
        final_url: url.to_string(),
    }
}

fn fail(kind: FailureKind) -> Result<FetchOutput, FetchError> {
    Err(FetchError::new(kind, "scripted"))
}

fn settings() -> FetchSettings {
    FetchSettings {
        base_delay: Duration::from_secs(3),
        backoff: vec![Duration::from_secs(60), Duration::from_secs(120)],
        max_retries: 3,
        retry_delay: Duration::from_secs(2),
        ..FetchSettings::default()
    }
}

fn assert_gap(earlier: Instant, later: Instant, expected: Duration) {
    let gap = later - earlier;
    assert!(
        gap >= expected && gap < expected + Duration::from_secs(1),
        "expected a gap of {expected:?}, got {gap:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn rate_limit_waits_60_then_120_then_surfaces() {
    let transport = Scripted::new(vec![
        fail(FailureKind::RateLimited),
        fail(FailureKind::RateLimited),
        fail(FailureKind::RateLimited),
    ]);
    let fetcher = ThrottledFetcher::new(transport.clone(), &settings());

    let err = fetcher.fetch("https://example.com/a").await.unwrap_err();
    assert_eq!(err.kind, FailureKind::RateLimited);

    let calls = transport.calls();
    assert_eq!(calls.len(), 3, "no third retry after the schedule");
    assert_gap(calls[0], calls[1], Duration::from_secs(60));
    assert_gap(calls[1], calls[2], Duration::from_secs(120));
}

#[tokio::test(start_paused = true)]
async fn rate_limit_recovers_within_schedule() {
    let transport = Scripted::new(vec![fail(FailureKind::RateLimited)]);
    let fetcher = ThrottledFetcher::new(transport.clone(), &settings());

    let output = fetcher.fetch("https://example.com/a").await.unwrap();
    assert_eq!(output.bytes, b"body");
    let calls = transport.calls();
    assert_eq!(calls.len(), 2);
    assert_gap(calls[0], calls[1], Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn pacing_resumes_after_a_backoff() {
    let transport = Scripted::new(vec![fail(FailureKind::RateLimited)]);
    let fetcher = ThrottledFetcher::new(transport.clone(), &settings());

    fetcher.fetch("https://example.com/a").await.unwrap();
    fetcher.fetch("https://example.com/b").await.unwrap();
    let calls = transport.calls();
    assert_eq!(calls.len(), 3);
    assert_gap(calls[1], calls[2], Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn not_found_is_never_retried() {
    let transport = Scripted::new(vec![fail(FailureKind::NotFound)]);
    let fetcher = ThrottledFetcher::new(transport.clone(), &settings());

    let err = fetcher.fetch("https://example.com/gone").await.unwrap_err();
    assert_eq!(err.kind, FailureKind::NotFound);
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_errors_are_retried_then_succeed() {
    let transport = Scripted::new(vec![
        fail(FailureKind::Timeout),
        fail(FailureKind::Network),
        fail(FailureKind::HttpStatus(502)),
    ]);
    let fetcher = ThrottledFetcher::new(transport.clone(), &settings());

    assert!(fetcher.fetch("https://example.com/a").await.is_ok());
    assert_eq!(transport.calls().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn transient_retries_are_bounded() {
    let transport = Scripted::new(vec![
        fail(FailureKind::Timeout),
        fail(FailureKind::Timeout),
        fail(FailureKind::Timeout),
        fail(FailureKind::Timeout),
        fail(FailureKind::Timeout),
    ]);
    let fetcher = ThrottledFetcher::new(transport.clone(), &settings());

    let err = fetcher.fetch("https://example.com/a").await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Timeout);
    assert_eq!(transport.calls().len(), 4, "one attempt plus three retries");
}

#[tokio::test(start_paused = true)]
async fn requests_are_spaced_by_base_delay() {
    let transport = Scripted::new(Vec::new());
    let fetcher = ThrottledFetcher::new(transport.clone(), &settings());

    for i in 0..3 {
        fetcher.fetch(&format!("https://example.com/{i}")).await.unwrap();
    }
    let calls = transport.calls();
    assert_gap(calls[0], calls[1], Duration::from_secs(3));
    assert_gap(calls[1], calls[2], Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn backoff_restarts_after_a_non_rate_limited_answer() {
    let transport = Scripted::new(vec![
        fail(FailureKind::RateLimited),
        fail(FailureKind::HttpStatus(503)),
        fail(FailureKind::RateLimited),
        fail(FailureKind::RateLimited),
    ]);
    let fetcher = ThrottledFetcher::new(transport.clone(), &settings());

    assert!(fetcher.fetch("https://example.com/a").await.is_ok());

    let calls = transport.calls();
    assert_eq!(calls.len(), 5);
    assert_gap(calls[0], calls[1], Duration::from_secs(60));
    assert_gap(calls[1], calls[2], Duration::from_secs(3));
    assert_gap(calls[2], calls[3], Duration::from_secs(60));
    assert_gap(calls[3], calls[4], Duration::from_secs(120));
}
