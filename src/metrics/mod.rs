//! Throughput, latency and error metrics.
//!
//! A single [`MetricsAggregator`] is created at startup and handed to every
//! component that reports into it. Scalar counters are atomics; only the
//! error-kind histogram and the two rate windows sit behind locks.
//!
//! Derived values (success rates, hit rate, average latency, rates per second)
//! are computed when [`MetricsAggregator::summary`] is called and never stored.
//!
//! # Example
//!
//! ```rust
//! use card_cache::metrics::MetricsAggregator;
//! use card_cache::ErrorKind;
//!
//! let metrics = MetricsAggregator::default();
//! metrics.record_api_request(true, 120);
//! metrics.record_api_request(false, 80);
//! metrics.record_error(ErrorKind::NotFound);
//!
//! let summary = metrics.summary();
//! assert_eq!(summary.api_requests_total, 2);
//! assert_eq!(summary.average_response_time_ms, 100.0);
//! assert_eq!(summary.errors_by_type[&ErrorKind::NotFound], 1);
//! ```

mod window;

pub use window::RateWindow;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::time::Instant;

use crate::cache::CacheStats;
use crate::error::{ErrorKind, LookupError};

/// Default trailing window for the per-second rates.
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(60);

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Trailing window used for `commands_per_second` and `api_requests_per_second`.
    pub rate_window: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            rate_window: DEFAULT_RATE_WINDOW,
        }
    }
}

/// Process-wide metrics sink.
#[derive(Debug)]
pub struct MetricsAggregator {
    commands_total: AtomicU64,
    commands_successful: AtomicU64,
    commands_failed: AtomicU64,

    api_requests_total: AtomicU64,
    api_requests_successful: AtomicU64,
    api_requests_failed: AtomicU64,
    api_response_time_sum: AtomicU64,
    api_response_count: AtomicU64,

    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_size: AtomicU64,

    errors_by_type: RwLock<BTreeMap<ErrorKind, u64>>,

    command_window: Mutex<RateWindow>,
    api_window: Mutex<RateWindow>,

    started: Instant,
    started_at: OffsetDateTime,
}

impl MetricsAggregator {
    /// Create a new aggregator. Uptime is measured from this call.
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            commands_total: AtomicU64::new(0),
            commands_successful: AtomicU64::new(0),
            commands_failed: AtomicU64::new(0),
            api_requests_total: AtomicU64::new(0),
            api_requests_successful: AtomicU64::new(0),
            api_requests_failed: AtomicU64::new(0),
            api_response_time_sum: AtomicU64::new(0),
            api_response_count: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            cache_size: AtomicU64::new(0),
            errors_by_type: RwLock::new(BTreeMap::new()),
            command_window: Mutex::new(RateWindow::new(config.rate_window)),
            api_window: Mutex::new(RateWindow::new(config.rate_window)),
            started: Instant::now(),
            started_at: OffsetDateTime::now_utc(),
        }
    }

    /// Record a handled command.
    pub fn record_command(&self, success: bool) {
        self.commands_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.commands_successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.commands_failed.fetch_add(1, Ordering::Relaxed);
        }
        lock(&self.command_window).record();
    }

    /// Record an outbound API request and how long it took.
    pub fn record_api_request(&self, success: bool, response_time_ms: u64) {
        self.api_requests_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.api_requests_successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.api_requests_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.api_response_time_sum
            .fetch_add(response_time_ms, Ordering::Relaxed);
        self.api_response_count.fetch_add(1, Ordering::Relaxed);
        lock(&self.api_window).record();
    }

    /// Count one error of the given kind.
    pub fn record_error(&self, kind: ErrorKind) {
        let mut errors = self
            .errors_by_type
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *errors.entry(kind).or_insert(0) += 1;
    }

    /// Classify and count a lookup error.
    pub fn record_failure(&self, error: &LookupError) {
        self.record_error(error.kind());
    }

    /// Overwrite the cache gauges with the cache's own counters.
    pub fn update_cache_stats(&self, hits: u64, misses: u64, size: u64) {
        self.cache_hits.store(hits, Ordering::Relaxed);
        self.cache_misses.store(misses, Ordering::Relaxed);
        self.cache_size.store(size, Ordering::Relaxed);
    }

    /// Copy the counters of a [`CacheStats`] snapshot into the cache gauges.
    pub fn observe_cache(&self, stats: &CacheStats) {
        self.update_cache_stats(stats.hits, stats.misses, stats.size as u64);
    }

    /// Mean API response time in milliseconds, 0 before the first request.
    pub fn average_response_time_ms(&self) -> f64 {
        let sum = self.api_response_time_sum.load(Ordering::Relaxed);
        let count = self.api_response_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        sum as f64 / count as f64
    }

    /// Command success rate as a percentage.
    pub fn command_success_rate(&self) -> f64 {
        percent(
            self.commands_successful.load(Ordering::Relaxed),
            self.commands_total.load(Ordering::Relaxed),
        )
    }

    /// API success rate as a percentage.
    pub fn api_success_rate(&self) -> f64 {
        percent(
            self.api_requests_successful.load(Ordering::Relaxed),
            self.api_requests_total.load(Ordering::Relaxed),
        )
    }

    /// Cache hit rate as a percentage of the last reported cache counters.
    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        percent(hits, hits + misses)
    }

    /// Time since the aggregator was created.
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Build a summary from the counters as they are right now.
    pub fn summary(&self) -> MetricsSummary {
        let errors_by_type = self
            .errors_by_type
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        MetricsSummary {
            commands_total: self.commands_total.load(Ordering::Relaxed),
            commands_successful: self.commands_successful.load(Ordering::Relaxed),
            commands_failed: self.commands_failed.load(Ordering::Relaxed),
            commands_per_second: lock(&self.command_window).rate(),
            command_success_rate_percent: self.command_success_rate(),
            api_requests_total: self.api_requests_total.load(Ordering::Relaxed),
            api_requests_successful: self.api_requests_successful.load(Ordering::Relaxed),
            api_requests_failed: self.api_requests_failed.load(Ordering::Relaxed),
            api_requests_per_second: lock(&self.api_window).rate(),
            api_success_rate_percent: self.api_success_rate(),
            average_response_time_ms: self.average_response_time_ms(),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_size: self.cache_size.load(Ordering::Relaxed),
            cache_hit_rate_percent: self.cache_hit_rate(),
            errors_by_type,
            uptime_seconds: self.uptime().as_secs_f64(),
            bot_start_time: self.started_at.format(&Rfc3339).unwrap_or_default(),
        }
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}

/// Read-time view of all metrics, with stable JSON key names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    // Commands
    pub commands_total: u64,
    pub commands_successful: u64,
    pub commands_failed: u64,
    pub commands_per_second: f64,
    pub command_success_rate_percent: f64,

    // API
    pub api_requests_total: u64,
    pub api_requests_successful: u64,
    pub api_requests_failed: u64,
    pub api_requests_per_second: f64,
    pub api_success_rate_percent: f64,
    pub average_response_time_ms: f64,

    // Cache
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_size: u64,
    pub cache_hit_rate_percent: f64,

    // Errors
    pub errors_by_type: BTreeMap<ErrorKind, u64>,

    // System
    pub uptime_seconds: f64,
    /// RFC 3339 timestamp of when the aggregator was created
    pub bot_start_time: String,
}

fn lock(window: &Mutex<RateWindow>) -> std::sync::MutexGuard<'_, RateWindow> {
    window.lock().unwrap_or_else(PoisonError::into_inner)
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;

    #[test]
    fn test_command_counters() {
        let metrics = MetricsAggregator::default();
        metrics.record_command(true);
        metrics.record_command(true);
        metrics.record_command(true);
        metrics.record_command(false);

        let summary = metrics.summary();
        assert_eq!(summary.commands_total, 4);
        assert_eq!(summary.commands_successful, 3);
        assert_eq!(summary.commands_failed, 1);
        assert_eq!(summary.command_success_rate_percent, 75.0);
        assert!(summary.commands_per_second > 0.0);
    }

    #[test]
    fn test_empty_summary_has_zero_rates() {
        let summary = MetricsAggregator::default().summary();
        assert_eq!(summary.command_success_rate_percent, 0.0);
        assert_eq!(summary.api_success_rate_percent, 0.0);
        assert_eq!(summary.average_response_time_ms, 0.0);
        assert_eq!(summary.cache_hit_rate_percent, 0.0);
        assert_eq!(summary.commands_per_second, 0.0);
        assert!(summary.errors_by_type.is_empty());
    }

    #[test]
    fn test_error_histogram() {
        let metrics = MetricsAggregator::default();
        metrics.record_error(ErrorKind::Network);
        metrics.record_error(ErrorKind::Network);
        metrics.record_failure(&LookupError::Api(ApiError::new(404, "No card found")));

        let summary = metrics.summary();
        assert_eq!(summary.errors_by_type[&ErrorKind::Network], 2);
        assert_eq!(summary.errors_by_type[&ErrorKind::NotFound], 1);
        assert!(!summary.errors_by_type.contains_key(&ErrorKind::Malformed));
    }

    #[test]
    fn test_cache_gauges() {
        let metrics = MetricsAggregator::default();
        metrics.update_cache_stats(3, 1, 4);

        let summary = metrics.summary();
        assert_eq!(summary.cache_hits, 3);
        assert_eq!(summary.cache_misses, 1);
        assert_eq!(summary.cache_size, 4);
        assert_eq!(summary.cache_hit_rate_percent, 75.0);

        // Gauges are overwritten, not accumulated.
        metrics.update_cache_stats(0, 2, 2);
        assert_eq!(metrics.summary().cache_hits, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rates_slide_out_of_window() {
        let metrics = MetricsAggregator::new(MetricsConfig {
            rate_window: Duration::from_secs(60),
        });
        for _ in 0..5 {
            metrics.record_command(true);
        }
        assert_eq!(metrics.summary().commands_per_second, 5.0 / 60.0);

        tokio::time::advance(Duration::from_secs(61)).await;
        let summary = metrics.summary();
        assert_eq!(summary.commands_per_second, 0.0);
        // Totals are unaffected by the window.
        assert_eq!(summary.commands_total, 5);

        metrics.record_command(true);
        assert_eq!(metrics.summary().commands_per_second, 1.0 / 60.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uptime_and_start_time() {
        let metrics = MetricsAggregator::default();
        tokio::time::advance(Duration::from_secs(5)).await;

        let summary = metrics.summary();
        assert!(summary.uptime_seconds >= 5.0);
        assert!(OffsetDateTime::parse(&summary.bot_start_time, &Rfc3339).is_ok());
    }

    #[test]
    fn test_summary_json_keys() {
        let metrics = MetricsAggregator::default();
        metrics.record_error(ErrorKind::RateLimited);

        let json = serde_json::to_value(metrics.summary()).unwrap();
        for key in [
            "commands_total",
            "commands_successful",
            "commands_failed",
            "commands_per_second",
            "command_success_rate_percent",
            "api_requests_total",
            "api_requests_successful",
            "api_requests_failed",
            "api_requests_per_second",
            "api_success_rate_percent",
            "average_response_time_ms",
            "cache_hits",
            "cache_misses",
            "cache_size",
            "cache_hit_rate_percent",
            "errors_by_type",
            "uptime_seconds",
            "bot_start_time",
        ] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
        assert_eq!(json["errors_by_type"]["RateLimited"], 1);
    }
}
