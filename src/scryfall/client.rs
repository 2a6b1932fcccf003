//! Scryfall REST API client implementation.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::Instant;

use crate::error::{ApiError, ErrorKind, LookupError};
use crate::metrics::MetricsAggregator;
use crate::rate_limit::RateLimiter;
use crate::scryfall::endpoints::{CARDS_NAMED, CARDS_RANDOM, CARDS_SEARCH, SCRYFALL_BASE_URL};
use crate::scryfall::traits::CardSource;
use crate::scryfall::types::{Card, SearchResult};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The Scryfall REST API client.
///
/// Every request waits on the shared [`RateLimiter`] first and reports its
/// outcome to the shared [`MetricsAggregator`]. Failed requests are never
/// retried.
///
/// # Example
///
/// ```rust,no_run
/// use card_cache::scryfall::ScryfallClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = ScryfallClient::new();
///
///     let card = client.get_card_by_name("lightning bolt").await?;
///     println!("{}: {:?}", card.display_name(), card.best_image_url());
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct ScryfallClient {
    http_client: ClientWithMiddleware,
    base_url: String,
    limiter: RateLimiter,
    metrics: Arc<MetricsAggregator>,
}

#[derive(Serialize)]
struct NamedRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    fuzzy: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exact: Option<&'a str>,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
}

impl ScryfallClient {
    /// Create a new client with default settings and its own limiter and metrics.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new client builder.
    pub fn builder() -> ScryfallClientBuilder {
        ScryfallClientBuilder::new()
    }

    /// Look up a card by name using fuzzy matching.
    pub async fn get_card_by_name(&self, name: &str) -> Result<Card, LookupError> {
        let name = self.require_input(name, "card name cannot be empty")?;
        let params = NamedRequest {
            fuzzy: Some(name),
            exact: None,
        };
        let card: Card = self.get_with_params(CARDS_NAMED, &params).await?;
        tracing::debug!(query = name, card_name = %card.name, "retrieved card");
        Ok(card)
    }

    /// Look up a card by its exact name.
    pub async fn get_card_by_exact_name(&self, name: &str) -> Result<Card, LookupError> {
        let name = self.require_input(name, "card name cannot be empty")?;
        let params = NamedRequest {
            fuzzy: None,
            exact: Some(name),
        };
        let card: Card = self.get_with_params(CARDS_NAMED, &params).await?;
        tracing::debug!(query = name, card_name = %card.name, "retrieved card by exact name");
        Ok(card)
    }

    /// Get a random card.
    pub async fn get_random_card(&self) -> Result<Card, LookupError> {
        let card: Card = self.get(CARDS_RANDOM).await?;
        tracing::debug!(card_name = %card.name, "retrieved random card");
        Ok(card)
    }

    /// Run a full-text search. Scryfall answers 404 when nothing matches.
    pub async fn search_cards(&self, query: &str) -> Result<SearchResult, LookupError> {
        let query = self.require_input(query, "search query cannot be empty")?;
        let result: SearchResult = self
            .get_with_params(CARDS_SEARCH, &SearchRequest { q: query })
            .await?;
        tracing::debug!(query, results = result.total_cards, "searched cards");
        Ok(result)
    }

    /// Run a full-text search and return the first card.
    ///
    /// An empty result page is reported as a not-found [`ApiError`].
    pub async fn search_card_first(&self, query: &str) -> Result<Card, LookupError> {
        let result = self.search_cards(query).await?;

        match result.data.into_iter().next() {
            Some(card) => Ok(card),
            None => {
                let err = LookupError::Api(ApiError::new(
                    404,
                    format!("no cards found for query '{}'", query.trim()),
                ));
                self.metrics.record_failure(&err);
                Err(err)
            }
        }
    }

    /// Release the shared rate limiter. Call once no more requests will be made.
    pub fn close(&self) {
        self.limiter.close();
    }

    /// Get the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the shared rate limiter.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Get the shared metrics sink.
    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    /// Reject blank input before any request is made.
    fn require_input<'a>(&self, input: &'a str, message: &str) -> Result<&'a str, LookupError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            self.metrics.record_error(ErrorKind::Validation);
            return Err(LookupError::Validation(message.to_string()));
        }
        Ok(trimmed)
    }

    /// Make a GET request.
    async fn get<T>(&self, endpoint: &str) -> Result<T, LookupError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        self.execute(endpoint, &url).await
    }

    /// Make a GET request with query parameters.
    async fn get_with_params<T, Q>(&self, endpoint: &str, params: &Q) -> Result<T, LookupError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let query_string = serde_urlencoded::to_string(params)
            .map_err(|e| LookupError::Validation(e.to_string()))?;
        let url = if query_string.is_empty() {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}{}?{}", self.base_url, endpoint, query_string)
        };
        self.execute(endpoint, &url).await
    }

    /// Wait for a slot, send the request and record the outcome.
    async fn execute<T>(&self, endpoint: &str, url: &str) -> Result<T, LookupError>
    where
        T: DeserializeOwned,
    {
        self.limiter.acquire().await;

        let start = Instant::now();
        tracing::debug!(endpoint, "sending request");
        let result = self.send(url).await;
        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        self.metrics.record_api_request(result.is_ok(), elapsed_ms);
        match &result {
            Ok(_) => tracing::debug!(endpoint, elapsed_ms, "request succeeded"),
            Err(err) => {
                self.metrics.record_failure(err);
                tracing::warn!(endpoint, elapsed_ms, kind = %err.kind(), error = %err, "request failed");
            }
        }

        result
    }

    async fn send<T>(&self, url: &str) -> Result<T, LookupError>
    where
        T: DeserializeOwned,
    {
        let response = self.http_client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_client_error() || status.is_server_error() {
            let api_error = serde_json::from_str::<ApiError>(&body)
                .unwrap_or_else(|_| ApiError::from_status(status.as_u16()));
            return Err(LookupError::Api(api_error));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

impl Default for ScryfallClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScryfallClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScryfallClient")
            .field("base_url", &self.base_url)
            .field("limiter", &self.limiter)
            .finish()
    }
}

/// Builder for [`ScryfallClient`].
pub struct ScryfallClientBuilder {
    base_url: String,
    user_agent: Option<String>,
    timeout: Duration,
    limiter: Option<RateLimiter>,
    metrics: Option<Arc<MetricsAggregator>>,
}

impl ScryfallClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            base_url: SCRYFALL_BASE_URL.to_string(),
            user_agent: None,
            timeout: DEFAULT_TIMEOUT,
            limiter: None,
            metrics: None,
        }
    }

    /// Set the base URL (useful for testing against a mock server).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Share an existing rate limiter.
    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Share an existing metrics sink.
    pub fn metrics(mut self, metrics: Arc<MetricsAggregator>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the client.
    pub fn build(self) -> ScryfallClient {
        let mut headers = HeaderMap::new();
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("card-cache/{}", env!("CARGO_PKG_VERSION")));
        let header_value = HeaderValue::from_str(&user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static("card-cache"));
        headers.insert(USER_AGENT, header_value);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let reqwest_client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(self.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let client = ClientBuilder::new(reqwest_client)
            .with(TracingMiddleware::default())
            .build();

        ScryfallClient {
            http_client: client,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            limiter: self.limiter.unwrap_or_default(),
            metrics: self.metrics.unwrap_or_default(),
        }
    }
}

impl Default for ScryfallClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CardSource for ScryfallClient {
    async fn fetch_by_key(&self, key: &str) -> Result<Card, LookupError> {
        ScryfallClient::get_card_by_name(self, key).await
    }

    async fn search_card_first(&self, query: &str) -> Result<Card, LookupError> {
        ScryfallClient::search_card_first(self, query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let client = ScryfallClient::new();
        assert_eq!(client.base_url(), SCRYFALL_BASE_URL);
        assert!(client.limiter().config().enabled);
    }

    #[test]
    fn test_builder_trims_trailing_slash() {
        let client = ScryfallClient::builder()
            .base_url("http://localhost:1234/")
            .build();
        assert_eq!(client.base_url(), "http://localhost:1234");
    }

    #[test]
    fn test_named_request_encoding() {
        let params = NamedRequest {
            fuzzy: Some("jace the mind sculptor"),
            exact: None,
        };
        assert_eq!(
            serde_urlencoded::to_string(&params).unwrap(),
            "fuzzy=jace+the+mind+sculptor"
        );
    }

    #[tokio::test]
    async fn test_blank_name_rejected_before_request() {
        let metrics = Arc::new(MetricsAggregator::default());
        let client = ScryfallClient::builder()
            .base_url("http://127.0.0.1:9")
            .metrics(Arc::clone(&metrics))
            .build();

        let err = client.get_card_by_name("   ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let summary = metrics.summary();
        assert_eq!(summary.api_requests_total, 0);
        assert_eq!(summary.errors_by_type[&ErrorKind::Validation], 1);
    }
}
