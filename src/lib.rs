//! # Card Cache
//!
//! A lookup cache and observability layer in front of the rate-limited
//! Scryfall card API.
//!
//! ## Features
//!
//! - TTL + LRU cache with single-flight fetch coalescing
//! - Fixed-interval outbound rate limiting
//! - Throughput, latency and error-taxonomy metrics with sliding-window rates
//! - Async Scryfall client with strong typing and `rust_decimal` prices
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use card_cache::CardLookup;
//! use card_cache::config::LookupConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let lookup = CardLookup::from_config(LookupConfig::default());
//!     let outcome = lookup.lookup("lightning bolt").await?;
//!     println!("{}", outcome.card.display_name());
//!     println!("hit rate: {:.1}%", lookup.stats().hit_rate);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod lookup;
pub mod metrics;
pub mod rate_limit;
pub mod scryfall;

// Re-export commonly used types at crate root
pub use cache::{CacheStats, KeyedCache};
pub use error::{ErrorKind, LookupError};
pub use lookup::{CardLookup, LookupOutcome};
pub use metrics::{MetricsAggregator, MetricsSummary};
pub use rate_limit::RateLimiter;

/// Result type alias using LookupError
pub type Result<T> = std::result::Result<T, LookupError>;
