//! Card lookups through the cache, limiter and metrics.
//!
//! [`CardLookup`] is the composition root: one instance owns the cache and
//! shares the limiter and metrics with its [`CardSource`]. Plain name queries
//! are answered from the cache; queries with Scryfall search syntax go to the
//! search endpoint and, when that fails, fall back to a cached lookup of the
//! card name left after stripping the filters.
//!
//! # Example
//!
//! ```rust,no_run
//! use card_cache::config::LookupConfig;
//! use card_cache::lookup::CardLookup;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let lookup = CardLookup::from_config(LookupConfig::default());
//!
//!     let outcome = lookup.lookup("the one ring border:borderless e:ltr").await?;
//!     println!("{} (fallback: {})", outcome.card.display_name(), outcome.used_fallback);
//!
//!     println!("{}", serde_json::to_string_pretty(&lookup.summary())?);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::cache::{CacheStats, KeyedCache};
use crate::config::LookupConfig;
use crate::error::{ErrorKind, LookupError};
use crate::metrics::{MetricsAggregator, MetricsSummary};
use crate::rate_limit::RateLimiter;
use crate::scryfall::{Card, CardSource, ScryfallClient};

/// Search keys that take an operator (`set:ltr`, `cmc>=3`, `-is:foil`).
const FILTER_KEYS: &[&str] = &[
    "frame", "border", "is", "e", "set", "new", "not", "year", "rarity", "c", "cmc", "pow", "tou",
    "t", "o", "a", "flavor", "lore", "function", "unique", "artist", "watermark", "stamp",
];

/// Search keywords that stand on their own.
///
/// A query made of one of these words alone (e.g. "Foil") is a search, and
/// has no card name left to fall back to.
const FILTER_KEYWORDS: &[&str] = &[
    "foil",
    "nonfoil",
    "etched",
    "glossy",
    "textless",
    "fullart",
    "borderless",
    "colorshifted",
    "tombstone",
    "legendary",
    "reprint",
    "promo",
    "funny",
    "timeshifted",
];

const FILTER_OPERATORS: &[char] = &[':', '=', '<', '>'];

/// Result of a successful [`CardLookup::lookup`].
#[derive(Debug, Clone, PartialEq)]
pub struct LookupOutcome {
    /// The card that was found.
    pub card: Card,
    /// Whether the filtered search failed and the plain card name was used instead.
    pub used_fallback: bool,
}

/// Cached card lookups with rate limiting and metrics.
pub struct CardLookup<C = ScryfallClient> {
    source: C,
    cache: KeyedCache<Card, LookupError>,
    metrics: Arc<MetricsAggregator>,
    sweep_interval: Option<Duration>,
}

impl CardLookup<ScryfallClient> {
    /// Build the client, limiter, cache and metrics from one configuration.
    pub fn from_config(config: LookupConfig) -> Self {
        let metrics = Arc::new(MetricsAggregator::new(config.metrics));
        let client = ScryfallClient::builder()
            .rate_limiter(RateLimiter::new(config.rate_limit))
            .metrics(Arc::clone(&metrics))
            .build();
        let sweep_interval = config.cache.sweep_interval;

        let mut lookup = Self::new(client, KeyedCache::new(config.cache), metrics);
        lookup.sweep_interval = sweep_interval;
        lookup
    }

    /// Release the client's rate limiter.
    pub fn close(&self) {
        self.source.close();
    }
}

impl<C> CardLookup<C>
where
    C: CardSource + Clone + 'static,
{
    /// Compose a lookup from already-built parts.
    ///
    /// `metrics` should be the same aggregator the source reports into.
    pub fn new(
        source: C,
        cache: KeyedCache<Card, LookupError>,
        metrics: Arc<MetricsAggregator>,
    ) -> Self {
        Self {
            source,
            cache,
            metrics,
            sweep_interval: None,
        }
    }

    /// Resolve a user query to a card and record the outcome as one command.
    pub async fn lookup(&self, query: &str) -> Result<LookupOutcome, LookupError> {
        let result = self.resolve(query).await;
        self.metrics.record_command(result.is_ok());
        result
    }

    async fn resolve(&self, query: &str) -> Result<LookupOutcome, LookupError> {
        let query = query.trim();
        if query.is_empty() {
            self.metrics.record_error(ErrorKind::Validation);
            return Err(LookupError::Validation("card query cannot be empty".to_string()));
        }

        if !has_filter_parameters(query) {
            let card = self.cached(query).await?;
            return Ok(LookupOutcome {
                card,
                used_fallback: false,
            });
        }

        tracing::debug!(query, "using search endpoint for filtered query");
        let search_err = match self.source.search_card_first(query).await {
            Ok(card) => {
                return Ok(LookupOutcome {
                    card,
                    used_fallback: false,
                });
            }
            Err(err) => err,
        };

        let card_name = extract_card_name(query);
        if card_name.is_empty() {
            return Err(search_err);
        }

        tracing::debug!(query, fallback_name = %card_name, error = %search_err, "filtered search failed, trying card name");
        let card = self.cached(&card_name).await?;
        tracing::info!(query, fallback_name = %card_name, "fallback lookup succeeded");

        Ok(LookupOutcome {
            card,
            used_fallback: true,
        })
    }

    /// Look a plain card name up through the cache.
    async fn cached(&self, name: &str) -> Result<Card, LookupError> {
        let source = self.source.clone();
        let result = self
            .cache
            .get_or_set(&cache_key(name), move |key| async move {
                source.fetch_by_key(&key).await
            })
            .await;

        self.metrics.observe_cache(&self.cache.stats());
        result
    }

    /// Start the periodic purge of expired entries if one is configured.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_sweeper(&self) -> Option<JoinHandle<()>> {
        self.sweep_interval
            .map(|every| self.cache.spawn_sweeper(every))
    }
}

impl<C> CardLookup<C> {
    /// Current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Metrics summary as of now.
    pub fn summary(&self) -> MetricsSummary {
        self.metrics.summary()
    }

    /// Shared metrics sink.
    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    /// The underlying card source.
    pub fn source(&self) -> &C {
        &self.source
    }

    /// The underlying cache.
    pub fn cache(&self) -> &KeyedCache<Card, LookupError> {
        &self.cache
    }
}

impl<C: std::fmt::Debug> std::fmt::Debug for CardLookup<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardLookup")
            .field("source", &self.source)
            .field("cache", &self.cache)
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}

/// Check if a query uses Scryfall search syntax.
///
/// Matching is per whitespace-separated token: `legendary` is a filter, while
/// a name containing `t:` inside a word is not.
pub fn has_filter_parameters(query: &str) -> bool {
    query.split_whitespace().any(is_filter_token)
}

/// Strip search syntax from a query, leaving the card name.
pub fn extract_card_name(query: &str) -> String {
    query
        .split_whitespace()
        .filter(|token| !is_filter_token(token))
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_filter_token(token: &str) -> bool {
    let lower = token.to_lowercase();

    if FILTER_KEYWORDS.contains(&lower.as_str()) {
        return true;
    }

    let Some(idx) = lower.find(FILTER_OPERATORS) else {
        return false;
    };
    let key = lower[..idx].trim_start_matches('-');
    FILTER_KEYS.contains(&key)
}

/// Cache key for a plain name: case and spacing do not matter to fuzzy lookups.
fn cache_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::error::ApiError;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct MockSource {
        cards: Arc<HashMap<String, Card>>,
        search: Arc<HashMap<String, Card>>,
        fetches: Arc<AtomicUsize>,
        fetched_keys: Arc<Mutex<Vec<String>>>,
    }

    impl MockSource {
        fn with_card(name: &str) -> Self {
            let mut cards = HashMap::new();
            cards.insert(name.to_lowercase(), card(name));
            Self {
                cards: Arc::new(cards),
                ..Self::default()
            }
        }
    }

    impl CardSource for MockSource {
        async fn fetch_by_key(&self, key: &str) -> Result<Card, LookupError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.fetched_keys.lock().unwrap().push(key.to_string());
            self.cards
                .get(key)
                .cloned()
                .ok_or_else(|| LookupError::Api(ApiError::new(404, "not found")))
        }

        async fn search_card_first(&self, query: &str) -> Result<Card, LookupError> {
            self.search
                .get(query)
                .cloned()
                .ok_or_else(|| LookupError::Api(ApiError::new(404, "no cards found")))
        }
    }

    fn card(name: &str) -> Card {
        serde_json::from_value(serde_json::json!({
            "object": "card",
            "id": name.to_lowercase().replace(' ', "-"),
            "name": name,
        }))
        .unwrap()
    }

    fn lookup(source: MockSource) -> CardLookup<MockSource> {
        CardLookup::new(
            source,
            KeyedCache::new(CacheConfig::default()),
            Arc::new(MetricsAggregator::default()),
        )
    }

    #[test]
    fn test_has_filter_parameters() {
        assert!(has_filter_parameters("the one ring border:borderless e:ltr"));
        assert!(has_filter_parameters("lightning bolt is:fullart"));
        assert!(has_filter_parameters("mox ruby foil"));
        assert!(has_filter_parameters("goblin cmc>=3"));
        assert!(has_filter_parameters("counterspell -is:reprint"));
        assert!(has_filter_parameters("Black Lotus SET:lea"));

        assert!(!has_filter_parameters("lightning bolt"));
        assert!(!has_filter_parameters("Forest"));
        assert!(!has_filter_parameters("Tarmogoyf"));
        assert!(!has_filter_parameters("Circle of Protection: Red"));
    }

    #[test]
    fn test_extract_card_name() {
        assert_eq!(
            extract_card_name("the one ring border:borderless e:ltr"),
            "the one ring"
        );
        assert_eq!(extract_card_name("mox ruby foil is:vma"), "mox ruby");
        assert_eq!(extract_card_name("ancestral   recall frame:1993"), "ancestral recall");
        assert_eq!(extract_card_name("is:foil e:ltr"), "");
    }

    #[test]
    fn test_cache_key_normalization() {
        assert_eq!(cache_key("  Lightning   Bolt "), "lightning bolt");
    }

    #[tokio::test]
    async fn test_plain_lookup_is_cached() {
        let source = MockSource::with_card("Lightning Bolt");
        let fetches = Arc::clone(&source.fetches);
        let lookup = lookup(source);

        let first = lookup.lookup("Lightning Bolt").await.unwrap();
        let second = lookup.lookup("lightning  bolt").await.unwrap();

        assert_eq!(first, second);
        assert!(!first.used_fallback);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        let summary = lookup.summary();
        assert_eq!(summary.cache_hits, 1);
        assert_eq!(summary.cache_misses, 1);
        assert_eq!(summary.cache_size, 1);
        assert_eq!(summary.commands_successful, 2);
    }

    #[tokio::test]
    async fn test_filtered_search_hit_bypasses_cache() {
        let mut search = HashMap::new();
        search.insert("bolt e:m11".to_string(), card("Lightning Bolt"));
        let source = MockSource {
            search: Arc::new(search),
            ..MockSource::default()
        };
        let fetches = Arc::clone(&source.fetches);
        let lookup = lookup(source);

        let outcome = lookup.lookup("bolt e:m11").await.unwrap();
        assert_eq!(outcome.card.name, "Lightning Bolt");
        assert!(!outcome.used_fallback);
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
        assert!(lookup.cache().is_empty());
    }

    #[tokio::test]
    async fn test_filtered_search_falls_back_to_name() {
        let source = MockSource::with_card("The One Ring");
        let keys = Arc::clone(&source.fetched_keys);
        let lookup = lookup(source);

        let outcome = lookup
            .lookup("The One Ring border:borderless e:ltr")
            .await
            .unwrap();

        assert!(outcome.used_fallback);
        assert_eq!(outcome.card.name, "The One Ring");
        assert_eq!(*keys.lock().unwrap(), vec!["the one ring".to_string()]);
        assert_eq!(lookup.stats().size, 1);
    }

    #[tokio::test]
    async fn test_filters_only_returns_search_error() {
        let lookup = lookup(MockSource::default());

        let err = lookup.lookup("is:foil e:ltr").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(lookup.summary().commands_failed, 1);
    }

    #[tokio::test]
    async fn test_single_keyword_query_is_a_search() {
        assert!(has_filter_parameters("Foil"));
        assert_eq!(extract_card_name("Foil"), "");

        let mut search = HashMap::new();
        search.insert("Foil".to_string(), card("Foil"));
        let source = MockSource {
            search: Arc::new(search),
            ..MockSource::default()
        };
        let fetches = Arc::clone(&source.fetches);
        let lookup = lookup(source);

        let outcome = lookup.lookup("Foil").await.unwrap();
        assert_eq!(outcome.card.name, "Foil");
        assert!(!outcome.used_fallback);

        // Without a search match there is nothing to fall back to.
        let err = lookup.lookup("nonfoil").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_query_is_validation_error() {
        let source = MockSource::default();
        let fetches = Arc::clone(&source.fetches);
        let lookup = lookup(source);

        let err = lookup.lookup("   ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(fetches.load(Ordering::SeqCst), 0);

        let summary = lookup.summary();
        assert_eq!(summary.errors_by_type[&ErrorKind::Validation], 1);
        assert_eq!(summary.commands_failed, 1);
    }

    #[tokio::test]
    async fn test_sweeper_only_with_interval() {
        let lookup = lookup(MockSource::default());
        assert!(lookup.start_sweeper().is_none());
    }
}
