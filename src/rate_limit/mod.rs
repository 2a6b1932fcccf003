//! Outbound rate limiting for the Scryfall API.
//!
//! Scryfall asks clients to stay at or below 10 requests per second. This
//! module provides a process-wide fixed-interval gate: at most one request is
//! granted per interval across every caller sharing the limiter.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use card_cache::rate_limit::{RateLimitConfig, RateLimiter};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let limiter = RateLimiter::new(RateLimitConfig {
//!     interval: Duration::from_millis(50),
//!     enabled: true,
//! });
//!
//! // First grant is immediate, later ones are spaced by the interval.
//! limiter.acquire().await;
//! assert!(limiter.try_acquire().is_err());
//! # }
//! ```

mod interval;

pub use interval::RateLimiter;

use std::time::Duration;

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Minimum spacing between two granted requests.
    pub interval: Duration,
    /// Whether to enable rate limiting.
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            interval: limits::DEFAULT_INTERVAL,
            enabled: true,
        }
    }
}

/// Rate limit constants.
pub mod limits {
    use std::time::Duration;

    /// Spacing recommended by Scryfall (10 requests per second).
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);
}
