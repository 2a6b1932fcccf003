//! Concurrent lookup cache with TTL expiry, LRU eviction and single-flight fetches.
//!
//! [`KeyedCache::get_or_set`] is the only way values enter the cache: on a miss
//! the supplied fetch runs exactly once per key, however many callers ask for
//! that key at the same time. Every caller waiting on the same key receives the
//! same value or the same error.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use card_cache::cache::{CacheConfig, KeyedCache};
//! use card_cache::LookupError;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), LookupError> {
//! let cache: KeyedCache<String, LookupError> = KeyedCache::new(CacheConfig {
//!     ttl: Duration::from_secs(60),
//!     max_size: 100,
//!     ..CacheConfig::default()
//! });
//!
//! let value = cache
//!     .get_or_set("bolt", |key| async move { Ok(key.to_uppercase()) })
//!     .await?;
//! assert_eq!(value, "BOLT");
//!
//! // Second lookup is served from the cache, so this fetch never runs.
//! let value = cache
//!     .get_or_set("bolt", |key| async move { Ok(key) })
//!     .await?;
//! assert_eq!(value, "BOLT");
//! assert_eq!(cache.stats().hits, 1);
//! # Ok(())
//! # }
//! ```

mod keyed;
mod store;

pub use keyed::KeyedCache;

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Default maximum number of entries.
pub const DEFAULT_MAX_SIZE: usize = 1000;

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long an entry stays fresh after insertion.
    pub ttl: Duration,
    /// Maximum number of entries kept; least-recently-used entries are evicted beyond this.
    pub max_size: usize,
    /// Interval for the optional background sweep of expired entries.
    pub sweep_interval: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_size: DEFAULT_MAX_SIZE,
            sweep_interval: None,
        }
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Entries currently stored (expired entries not yet read or swept included).
    pub size: usize,
    /// Configured capacity.
    pub max_size: usize,
    /// Lookups served from a live entry.
    pub hits: u64,
    /// Successful fetches stored after a lookup found no live entry.
    pub misses: u64,
    /// `hits / (hits + misses)` as a percentage, 0 when nothing was looked up.
    pub hit_rate: f64,
    /// Entries removed to stay within capacity.
    pub evictions: u64,
    /// Lookups that waited on a fetch already in flight.
    pub coalesced: u64,
    /// Configured entry lifetime.
    pub ttl: Duration,
}

/// The fetch a caller was waiting on ended without producing a result.
///
/// Happens when the fetch task panics or the runtime shuts down under it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("in-flight fetch ended without a result")]
pub struct FlightAborted;

pub(crate) fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        (hits as f64 / total as f64) * 100.0
    }
}
