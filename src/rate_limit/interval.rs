//! Fixed-interval gate shared by every outbound request.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota};

use crate::rate_limit::RateLimitConfig;

/// A process-wide gate granting at most one request per interval.
///
/// Backed by a GCRA limiter with a burst of one, which amounts to a
/// monotonic "next allowed time" updated atomically. No ticker is involved.
///
/// Cloning is cheap and clones share the same gate. Waiters are not served
/// in arrival order: any blocked caller may receive the next slot.
#[derive(Clone)]
pub struct RateLimiter {
    gate: Option<Arc<DefaultDirectRateLimiter>>,
    clock: DefaultClock,
    config: RateLimitConfig,
    closed: Arc<AtomicBool>,
}

impl RateLimiter {
    /// Create a new limiter.
    ///
    /// A disabled config or a zero interval yields a limiter that never waits.
    pub fn new(config: RateLimitConfig) -> Self {
        let gate = if config.enabled {
            Quota::with_period(config.interval).map(|quota| Arc::new(DefaultDirectRateLimiter::direct(quota)))
        } else {
            None
        };

        Self {
            gate,
            clock: DefaultClock::default(),
            config,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create an enabled limiter with the given spacing.
    pub fn with_interval(interval: Duration) -> Self {
        Self::new(RateLimitConfig {
            interval,
            enabled: true,
        })
    }

    /// Create a limiter that never waits.
    pub fn unlimited() -> Self {
        Self::new(RateLimitConfig {
            interval: Duration::ZERO,
            enabled: false,
        })
    }

    /// Get the current configuration.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Try to take the next slot without waiting.
    ///
    /// Returns `Ok(())` if granted, or `Err(wait_time)` until the next slot opens.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        match &self.gate {
            None => Ok(()),
            Some(gate) => gate
                .check()
                .map_err(|not_until| not_until.wait_time_from(self.clock.now())),
        }
    }

    /// Wait until a slot is granted.
    ///
    /// There is no timeout; wrap the call in `tokio::time::timeout` for a deadline.
    pub async fn acquire(&self) {
        if self.is_closed() {
            tracing::warn!("acquire called on a closed rate limiter");
        }

        if let Some(gate) = &self.gate {
            gate.until_ready().await;
        }
    }

    /// Mark the limiter as released.
    ///
    /// Callers should stop issuing requests first. The gate keeps spacing any
    /// later `acquire` calls.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("rate limiter closed");
        }
    }

    /// Check if [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_first_request_is_immediate() {
        let limiter = RateLimiter::with_interval(Duration::from_secs(1));

        assert!(limiter.try_acquire().is_ok());
        let wait = limiter.try_acquire().unwrap_err();
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_secs(1));
    }

    #[test]
    fn test_disabled_limiter_never_waits() {
        let limiter = RateLimiter::unlimited();
        for _ in 0..100 {
            assert!(limiter.try_acquire().is_ok());
        }

        let zero = RateLimiter::with_interval(Duration::ZERO);
        assert!(zero.try_acquire().is_ok());
        assert!(zero.try_acquire().is_ok());
    }

    #[test]
    fn test_clones_share_the_gate() {
        let limiter = RateLimiter::with_interval(Duration::from_secs(1));
        let other = limiter.clone();

        assert!(limiter.try_acquire().is_ok());
        assert!(other.try_acquire().is_err());
    }

    #[tokio::test]
    async fn test_sequential_acquires_respect_interval() {
        let limiter = RateLimiter::with_interval(Duration::from_millis(50));
        let start = Instant::now();

        for _ in 0..5 {
            limiter.acquire().await;
        }

        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_concurrent_acquires_share_one_gate() {
        let limiter = RateLimiter::with_interval(Duration::from_millis(40));
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(start.elapsed() >= Duration::from_millis(120));
    }

    #[test]
    fn test_close() {
        let limiter = RateLimiter::default();
        assert!(!limiter.is_closed());
        limiter.close();
        limiter.close();
        assert!(limiter.is_closed());
    }
}
