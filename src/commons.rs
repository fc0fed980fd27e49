use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Bounded retry budget for one logical API operation.
pub const MAX_RETRIES: u32 = 4;
pub const INITIAL_RETRY_DELAY_MS: u64 = 500;
pub const MAX_RETRY_DELAY_MS: u64 = 16_000;

/// Exponential backoff delay before retry attempt `attempt` (1-based).
pub fn retry_delay(attempt: u32) -> Duration {
    let millis = INITIAL_RETRY_DELAY_MS
        .saturating_mul(1 << attempt.saturating_sub(1).min(10))
        .min(MAX_RETRY_DELAY_MS);
    Duration::from_millis(millis)
}

/// Failure modes of the read-only wiki API boundary.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Network-level failure or a throttling/5xx response; safe to retry.
    #[error("transient API failure: {0}")]
    Transient(String),
    /// The page no longer exists (category membership raced with the fetch).
    #[error("page not found: {0}")]
    NotFound(String),
    /// The API answered but not in the shape we expect; retried, since stale
    /// caches and intermediaries produce these too.
    #[error("malformed API response: {0}")]
    Malformed(String),
}

impl ApiError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transient(_) | ApiError::Malformed(_) => true,
            ApiError::NotFound(_) => false,
        }
    }
}

/// Retries `operation` within the bounded budget, backing off exponentially
/// between attempts. Non-retryable errors surface immediately.
pub async fn with_retry<T, F, Fut>(what: &str, mut operation: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt < MAX_RETRIES => {
                attempt += 1;
                let delay = retry_delay(attempt);
                tracing::warn!(
                    what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}

/// A category-membership query: files in `include` that are not in `exclude`.
#[derive(Debug, Clone)]
pub struct CategoryQuery {
    pub include: String,
    pub exclude: String,
    /// Titles per search request (the API caps this at 500).
    pub batch_size: usize,
}

impl CategoryQuery {
    pub fn new(include: impl Into<String>, exclude: impl Into<String>) -> Self {
        Self {
            include: include.into(),
            exclude: exclude.into(),
            batch_size: 500,
        }
    }

    /// CirrusSearch expression selecting the wanted file pages.
    fn search_expression(&self) -> String {
        format!(
            "incategory:\"{}\" -incategory:\"{}\"",
            self.include, self.exclude
        )
    }
}

/// One page of discovery results.
#[derive(Debug, Clone)]
pub struct SearchBatch {
    /// `File:...` titles in API order.
    pub titles: Vec<String>,
    /// Continuation offset for the next batch, if the API reported more.
    pub next_offset: Option<usize>,
}

/// The read-only wiki content API the pipeline runs against.
///
/// Both operations are idempotent and safe to retry. Tests substitute an
/// in-memory implementation; production uses [`HttpApi`].
#[async_trait]
pub trait WikiApi: Send + Sync {
    /// One page of file titles matching `query`, starting at `offset`.
    async fn search_batch(&self, query: &CategoryQuery, offset: usize)
        -> Result<SearchBatch, ApiError>;

    /// Raw wikitext of the page with the given title.
    async fn wikitext(&self, title: &str) -> Result<String, ApiError>;
}

// serde shapes for the two API responses (formatversion=2)

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "continue")]
    cont: Option<SearchContinue>,
    query: Option<SearchQuery>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct SearchContinue {
    sroffset: usize,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    parse: Option<ParseBody>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ParseBody {
    wikitext: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: String,
    info: Option<String>,
}

/// reqwest-backed [`WikiApi`] implementation.
///
/// Every request carries the identifying User-Agent required by the Wikimedia
/// API etiquette, and all requests share one throttle: a minimum spacing
/// between calls, held in a mutex so the budget stays respected even if
/// callers ever fetch concurrently.
pub struct HttpApi {
    client: reqwest::Client,
    api_url: String,
    min_spacing: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl HttpApi {
    pub fn new(
        api_url: impl Into<String>,
        user_agent: &str,
        min_spacing: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ApiError::Transient(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            min_spacing,
            last_request: Mutex::new(None),
        })
    }

    /// Waits until the shared request budget allows another call.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let next_allowed = previous + self.min_spacing;
            tokio::time::sleep_until(next_allowed).await;
        }
        *last = Some(Instant::now());
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        params: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        self.throttle().await;

        let response = self
            .client
            .get(&self.api_url)
            .query(params)
            .send()
            .await
            .map_err(|e| ApiError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::Transient(format!("HTTP status {status}")));
        }
        if !status.is_success() {
            return Err(ApiError::Malformed(format!("HTTP status {status}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl WikiApi for HttpApi {
    async fn search_batch(
        &self,
        query: &CategoryQuery,
        offset: usize,
    ) -> Result<SearchBatch, ApiError> {
        let expression = query.search_expression();
        let batch_size = query.batch_size.to_string();
        let offset_param = offset.to_string();
        let params = [
            ("action", "query"),
            ("format", "json"),
            ("formatversion", "2"),
            ("list", "search"),
            ("srsearch", expression.as_str()),
            ("srnamespace", "6"),
            ("srlimit", batch_size.as_str()),
            ("sroffset", offset_param.as_str()),
        ];

        let response: SearchResponse = self.get(&params).await?;
        if let Some(error) = response.error {
            return Err(ApiError::Malformed(format!(
                "search error {}: {}",
                error.code,
                error.info.unwrap_or_default()
            )));
        }

        let query_body = response
            .query
            .ok_or_else(|| ApiError::Malformed("search response without query body".into()))?;
        Ok(SearchBatch {
            titles: query_body.search.into_iter().map(|hit| hit.title).collect(),
            next_offset: response.cont.map(|c| c.sroffset),
        })
    }

    async fn wikitext(&self, title: &str) -> Result<String, ApiError> {
        let params = [
            ("action", "parse"),
            ("format", "json"),
            ("formatversion", "2"),
            ("page", title),
            ("prop", "wikitext"),
        ];

        let response: ParseResponse = self.get(&params).await?;
        if let Some(error) = response.error {
            if error.code == "missingtitle" || error.code == "pagecannotexist" {
                return Err(ApiError::NotFound(title.to_owned()));
            }
            return Err(ApiError::Malformed(format!(
                "parse error {}: {}",
                error.code,
                error.info.unwrap_or_default()
            )));
        }

        response
            .parse
            .map(|body| body.wikitext)
            .ok_or_else(|| ApiError::Malformed("parse response without wikitext".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        assert_eq!(retry_delay(1), Duration::from_millis(500));
        assert_eq!(retry_delay(2), Duration::from_millis(1000));
        assert_eq!(retry_delay(3), Duration::from_millis(2000));
        assert_eq!(retry_delay(20), Duration::from_millis(MAX_RETRY_DELAY_MS));
    }

    #[test]
    fn test_not_found_is_not_retryable() {
        assert!(!ApiError::NotFound("File:X.jpg".into()).is_retryable());
        assert!(ApiError::Transient("timeout".into()).is_retryable());
        assert!(ApiError::Malformed("bad json".into()).is_retryable());
    }

    #[test]
    fn test_search_expression() {
        let query = CategoryQuery::new("Media from Delpher", "Scans from the Internet Archive");
        assert_eq!(
            query.search_expression(),
            "incategory:\"Media from Delpher\" -incategory:\"Scans from the Internet Archive\""
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_recovers_within_budget() {
        let attempts = AtomicU32::new(0);
        let result = with_retry("test op", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ApiError::Transient("flaky".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_gives_up_after_budget() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = with_retry("test op", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(ApiError::Transient("down".into())) }
        })
        .await;
        assert!(matches!(result, Err(ApiError::Transient(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1 + MAX_RETRIES);
    }

    #[tokio::test]
    async fn test_with_retry_surfaces_not_found_immediately() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = with_retry("test op", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(ApiError::NotFound("File:Gone.jpg".into())) }
        })
        .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_search_response_shape() {
        let json = r#"{
            "batchcomplete": true,
            "continue": { "sroffset": 500, "continue": "-||" },
            "query": {
                "searchinfo": { "totalhits": 1234 },
                "search": [
                    { "ns": 6, "title": "File:A.jpg" },
                    { "ns": 6, "title": "File:B.png" }
                ]
            }
        }"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        let query = parsed.query.unwrap();
        assert_eq!(query.search.len(), 2);
        assert_eq!(query.search[0].title, "File:A.jpg");
        assert_eq!(parsed.cont.unwrap().sroffset, 500);
    }

    #[test]
    fn test_parse_response_shape() {
        let json = r#"{
            "parse": { "title": "File:A.jpg", "pageid": 7, "wikitext": "{{PD-old}}" }
        }"#;
        let parsed: ParseResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.parse.unwrap().wikitext, "{{PD-old}}");
    }
}
