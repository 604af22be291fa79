//! Paginated article fetching with bounded retry and request pacing.

use crate::config::Config;
use crate::error::{FetchError, RequestError};
use crate::land::models::TradeType;
use crate::land::session::{ApiResponse, AuthenticatedRequester};
use rand::RngExt;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

const RATE_LIMITED: u16 = 429;

/// One page of raw articles.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticlePage {
    pub articles: Vec<Value>,
    pub has_more: bool,
}

/// Exponential backoff schedule for retryable failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_ms: u64,
    pub jitter_ms: u64,
}

impl RetryPolicy {
    /// Builds the policy from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_ms: config.backoff_base_ms,
            jitter_ms: config.backoff_jitter_ms,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// `base * 2^(attempt-1)` plus jitter below `base`, so successive delays
    /// strictly increase whenever `base` is non-zero.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(20));
        let jitter_cap = self.jitter_ms.min(self.base_ms.saturating_sub(1));
        let jitter = if jitter_cap > 0 { rand::rng().random_range(0..=jitter_cap) } else { 0 };
        Duration::from_millis(exp.saturating_add(jitter))
    }
}

/// Randomized pause between successive requests.
#[derive(Debug)]
pub struct Pacer {
    min_ms: u64,
    max_ms: u64,
    started: AtomicBool,
}

impl Pacer {
    /// Creates a pacer with a `[min_ms, max_ms]` window.
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms: max_ms.max(min_ms), started: AtomicBool::new(false) }
    }

    /// Picks a delay inside the window.
    pub fn next_delay(&self) -> Duration {
        if self.max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(self.min_ms..=self.max_ms))
    }

    /// Sleeps before every request except the very first one.
    pub async fn wait(&self) {
        if !self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let delay = self.next_delay();
        if !delay.is_zero() {
            debug!("Pacing {}ms before next request", delay.as_millis());
            tokio::time::sleep(delay).await;
        }
    }
}

/// What to do with a response or requester error.
enum Outcome {
    Page(ArticlePage),
    Retry(String),
    Fail(FetchError),
}

/// Fetches article pages through an authenticated session.
pub struct FetchClient<'a> {
    requester: &'a dyn AuthenticatedRequester,
    base_url: String,
    page_size: u32,
    policy: RetryPolicy,
    pacer: Pacer,
}

impl<'a> FetchClient<'a> {
    /// Creates a client that sends requests through `requester`.
    pub fn new(requester: &'a dyn AuthenticatedRequester, config: &Config) -> Self {
        Self {
            requester,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size,
            policy: RetryPolicy::from_config(config),
            pacer: Pacer::new(config.delay_min_ms, config.delay_max_ms),
        }
    }

    /// Builds the article list URL for one page.
    pub fn page_url(&self, entity_id: &str, trade_type: TradeType, page: u32) -> String {
        let id = urlencoding::encode(entity_id);
        format!(
            "{}/api/articles/complex/{}?realEstateType=APT&tradeType={}&page={}&pageSize={}&complexNo={}",
            self.base_url, id, trade_type.code(), page, self.page_size, id
        )
    }

    /// Fetches one page, retrying rate limits and transport failures.
    pub async fn fetch_page(
        &self,
        entity_id: &str,
        trade_type: TradeType,
        page: u32,
    ) -> Result<ArticlePage, FetchError> {
        let url = self.page_url(entity_id, trade_type, page);
        info!("Fetching complex={} trade={} page={}", entity_id, trade_type, page);

        let mut attempt = 1;
        loop {
            self.pacer.wait().await;
            debug!("GET {} (attempt {}/{})", url, attempt, self.policy.max_attempts);

            let reason = match self.classify(self.requester.get_json(&url).await) {
                Outcome::Page(page) => return Ok(page),
                Outcome::Fail(err) => return Err(err),
                Outcome::Retry(reason) => reason,
            };

            if attempt >= self.policy.max_attempts {
                warn!("Giving up on {} after {} attempts: {}", url, attempt, reason);
                return Err(FetchError::RetriesExhausted { attempts: attempt, last_error: reason });
            }

            let backoff = self.policy.backoff(attempt);
            warn!(
                "Attempt {}/{} failed ({}), backing off {}ms",
                attempt,
                self.policy.max_attempts,
                reason,
                backoff.as_millis()
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    fn classify(&self, result: Result<ApiResponse, RequestError>) -> Outcome {
        let response = match result {
            Ok(response) => response,
            Err(RequestError::Transport(msg)) => return Outcome::Retry(msg),
            Err(RequestError::Decode(msg)) => {
                return Outcome::Fail(FetchError::MalformedResponse(msg));
            }
        };

        match response.status {
            RATE_LIMITED => Outcome::Retry("rate limited (HTTP 429)".to_string()),
            401 | 403 => Outcome::Fail(FetchError::Unauthorized(response.status)),
            _ if !response.is_success() => Outcome::Fail(FetchError::HttpStatus(response.status)),
            _ => match self.parse_page(response.body) {
                Ok(page) => Outcome::Page(page),
                Err(err) => Outcome::Fail(err),
            },
        }
    }

    /// Extracts the article list and the has-more signal from a response body.
    pub fn parse_page(&self, body: Value) -> Result<ArticlePage, FetchError> {
        let Value::Object(mut map) = body else {
            return Err(FetchError::MalformedResponse("body is not a JSON object".to_string()));
        };

        let articles = match map.remove("articleList") {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(FetchError::MalformedResponse(
                    "articleList is not an array".to_string(),
                ));
            }
            None => {
                return Err(FetchError::MalformedResponse("missing articleList".to_string()));
            }
        };

        let has_more = if articles.is_empty() {
            false
        } else {
            match map.get("isMoreData").and_then(Value::as_bool) {
                Some(flag) => flag,
                None => articles.len() >= self.page_size as usize,
            }
        };

        debug!("Page holds {} articles (has_more: {})", articles.len(), has_more);
        Ok(ArticlePage { articles, has_more })
    }
}


#[cfg(test)]
mod tests {
    use super::mock::ScriptedRequester;
    use super::*;
    use serde_json::json;

    fn test_config() -> Config {
        Config { base_url: "https://land.test".to_string(), ..Config::default() }.without_delays()
    }

    fn ok(body: Value) -> Result<ApiResponse, RequestError> {
        Ok(ApiResponse::new(200, body))
    }

    fn status(code: u16) -> Result<ApiResponse, RequestError> {
        Ok(ApiResponse::new(code, Value::Null))
    }

    #[test]
    fn test_page_url() {
        let requester = ScriptedRequester::default();
        let config = test_config();
        let client = FetchClient::new(&requester, &config);

        assert_eq!(
            client.page_url("8928", TradeType::B2, 3),
            "https://land.test/api/articles/complex/8928?realEstateType=APT&tradeType=B2&page=3&pageSize=20&complexNo=8928"
        );
    }

    #[tokio::test]
    async fn test_fetch_page_success() {
        let requester = ScriptedRequester::new(vec![ok(json!({
            "isMoreData": true,
            "articleList": [{"articleNo": "1"}, {"articleNo": "2"}]
        }))]);
        let config = test_config();
        let client = FetchClient::new(&requester, &config);

        let page = client.fetch_page("8928", TradeType::A1, 1).await.unwrap();
        assert_eq!(page.articles.len(), 2);
        assert!(page.has_more);
        assert_eq!(requester.calls(), 1);
    }

    #[tokio::test]
    async fn test_persistent_rate_limit_makes_exactly_three_attempts() {
        let requester = ScriptedRequester::new(vec![status(429), status(429), status(429), status(429)]);
        let config = test_config();
        let client = FetchClient::new(&requester, &config);

        let err = client.fetch_page("8928", TradeType::A1, 1).await.unwrap_err();
        assert!(matches!(err, FetchError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(requester.calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_are_paced() {
        let requester = ScriptedRequester::new(vec![status(429), status(429), status(429)]);
        let mut config = test_config();
        config.delay_min_ms = 20;
        config.delay_max_ms = 20;
        config.backoff_base_ms = 0;
        config.backoff_jitter_ms = 0;
        let client = FetchClient::new(&requester, &config);

        // No backoff, so only the pacer can account for the elapsed time:
        // the first attempt goes out at once, each retry waits 20ms.
        let start = std::time::Instant::now();
        let err = client.fetch_page("8928", TradeType::A1, 1).await.unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, FetchError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(requester.calls(), 3);
        assert!(elapsed >= Duration::from_millis(40), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_transport_failure_then_success() {
        let requester = ScriptedRequester::new(vec![
            Err(RequestError::Transport("connection reset".into())),
            ok(json!({"articleList": [{"articleNo": "1"}]})),
        ]);
        let config = test_config();
        let client = FetchClient::new(&requester, &config);

        let page = client.fetch_page("8928", TradeType::A1, 1).await.unwrap();
        assert_eq!(page.articles.len(), 1);
        assert_eq!(requester.calls(), 2);
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let requester = ScriptedRequester::new(vec![status(401), ok(json!({"articleList": []}))]);
        let config = test_config();
        let client = FetchClient::new(&requester, &config);

        let err = client.fetch_page("8928", TradeType::A1, 1).await.unwrap_err();
        assert_eq!(err, FetchError::Unauthorized(401));
        assert_eq!(requester.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_not_retried() {
        let requester = ScriptedRequester::new(vec![ok(json!({"unexpected": true}))]);
        let config = test_config();
        let client = FetchClient::new(&requester, &config);

        let err = client.fetch_page("8928", TradeType::A1, 1).await.unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));
        assert_eq!(requester.calls(), 1);
    }

    #[tokio::test]
    async fn test_decode_error_is_not_retried() {
        let requester =
            ScriptedRequester::new(vec![Err(RequestError::Decode("not json".into()))]);
        let config = test_config();
        let client = FetchClient::new(&requester, &config);

        let err = client.fetch_page("8928", TradeType::A1, 1).await.unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));
        assert_eq!(requester.calls(), 1);
    }

    #[tokio::test]
    async fn test_server_error_is_terminal() {
        let requester = ScriptedRequester::new(vec![status(500)]);
        let config = test_config();
        let client = FetchClient::new(&requester, &config);

        let err = client.fetch_page("8928", TradeType::A1, 1).await.unwrap_err();
        assert_eq!(err, FetchError::HttpStatus(500));
        assert_eq!(requester.calls(), 1);
    }

    #[test]
    fn test_has_more_signals() {
        let requester = ScriptedRequester::default();
        let mut config = test_config();
        config.page_size = 2;
        let client = FetchClient::new(&requester, &config);

        // Empty page always ends pagination
        let page = client.parse_page(json!({"isMoreData": true, "articleList": []})).unwrap();
        assert!(!page.has_more);

        // Explicit flag wins
        let page = client.parse_page(json!({"isMoreData": false, "articleList": [1, 2]})).unwrap();
        assert!(!page.has_more);
        let page = client.parse_page(json!({"isMoreData": true, "articleList": [1]})).unwrap();
        assert!(page.has_more);

        // Without a flag a short page is terminal
        let page = client.parse_page(json!({"articleList": [1]})).unwrap();
        assert!(!page.has_more);
        let page = client.parse_page(json!({"articleList": [1, 2]})).unwrap();
        assert!(page.has_more);
    }

    #[test]
    fn test_parse_page_rejects_bad_shapes() {
        let requester = ScriptedRequester::default();
        let config = test_config();
        let client = FetchClient::new(&requester, &config);

        assert!(client.parse_page(json!([1, 2])).is_err());
        assert!(client.parse_page(json!({"articleList": "nope"})).is_err());
        assert!(client.parse_page(Value::Null).is_err());
    }

    #[test]
    fn test_backoff_strictly_increases() {
        let policy = RetryPolicy { max_attempts: 3, base_ms: 100, jitter_ms: 5000 };
        for _ in 0..200 {
            let first = policy.backoff(1);
            let second = policy.backoff(2);
            let third = policy.backoff(3);
            assert!(first < second, "{:?} !< {:?}", first, second);
            assert!(second < third, "{:?} !< {:?}", second, third);
            assert!(first >= Duration::from_millis(100));
            assert!(first < Duration::from_millis(200));
        }
    }

    #[test]
    fn test_backoff_without_base_is_zero() {
        let policy = RetryPolicy { max_attempts: 3, base_ms: 0, jitter_ms: 500 };
        assert_eq!(policy.backoff(1), Duration::ZERO);
        assert_eq!(policy.backoff(3), Duration::ZERO);
    }

    #[test]
    fn test_pacer_window() {
        let pacer = Pacer::new(10, 20);
        for _ in 0..100 {
            let d = pacer.next_delay();
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(20));
        }
        assert_eq!(Pacer::new(0, 0).next_delay(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_pacer_skips_first_request() {
        let pacer = Pacer::new(5, 5);
        let start = std::time::Instant::now();
        pacer.wait().await;
        assert!(start.elapsed() < Duration::from_millis(5));
        pacer.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
