//! Top-level configuration bundle.

use crate::cache::CacheConfig;
use crate::metrics::MetricsConfig;
use crate::rate_limit::RateLimitConfig;

/// Configuration for a [`CardLookup`](crate::lookup::CardLookup) and the
/// components it owns.
#[derive(Debug, Clone, Default)]
pub struct LookupConfig {
    /// Cache sizing, lifetime and sweep.
    pub cache: CacheConfig,
    /// Outbound request spacing.
    pub rate_limit: RateLimitConfig,
    /// Rate window for the metrics summary.
    pub metrics: MetricsConfig,
}
