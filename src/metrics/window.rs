//! Sliding-window event rate.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Tracks event timestamps within a trailing window to compute a per-second rate.
///
/// Events older than the window are pruned from the front on every record
/// and every rate read, so they never contribute to the rate.
#[derive(Debug)]
pub struct RateWindow {
    /// Event timestamps, oldest first
    events: VecDeque<Instant>,
    /// Window duration
    window: Duration,
}

impl RateWindow {
    /// Create a new, empty window.
    pub fn new(window: Duration) -> Self {
        Self {
            events: VecDeque::new(),
            window,
        }
    }

    /// Record an event now.
    pub fn record(&mut self) {
        self.record_at(Instant::now());
    }

    /// Record an event at `at`.
    ///
    /// Timestamps are expected in non-decreasing order; an earlier one is
    /// clamped to the newest recorded event.
    pub fn record_at(&mut self, at: Instant) {
        let at = match self.events.back() {
            Some(&last) if at < last => last,
            _ => at,
        };
        self.events.push_back(at);
        self.prune(at);
    }

    /// Events per second over the window, as of now.
    pub fn rate(&mut self) -> f64 {
        self.rate_at(Instant::now())
    }

    /// Events per second over the window, as of `now`.
    pub fn rate_at(&mut self, now: Instant) -> f64 {
        self.prune(now);
        let secs = self.window.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.events.len() as f64 / secs
    }

    /// Number of retained events (some may be stale until the next prune).
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the window holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Window duration.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Drop every event with `now - t >= window` from the front.
    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.events.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_counts_events_in_window() {
        let mut window = RateWindow::new(Duration::from_secs(60));
        let start = Instant::now();

        for _ in 0..6 {
            window.record_at(start);
        }
        assert_eq!(window.rate_at(start), 0.1);
    }

    #[test]
    fn test_rate_drops_to_zero_after_window() {
        let mut window = RateWindow::new(Duration::from_secs(60));
        let start = Instant::now();

        for _ in 0..5 {
            window.record_at(start);
        }

        let later = start + Duration::from_secs(61);
        assert_eq!(window.rate_at(later), 0.0);
        assert!(window.is_empty());

        window.record_at(later);
        assert_eq!(window.rate_at(later), 1.0 / 60.0);
    }

    #[test]
    fn test_event_exactly_window_old_is_pruned() {
        let mut window = RateWindow::new(Duration::from_millis(100));
        let start = Instant::now();

        window.record_at(start);
        window.record_at(start + Duration::from_millis(50));
        assert_eq!(window.len(), 2);

        window.rate_at(start + Duration::from_millis(100));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_out_of_order_timestamp_is_clamped() {
        let mut window = RateWindow::new(Duration::from_secs(1));
        let start = Instant::now();

        window.record_at(start + Duration::from_millis(500));
        window.record_at(start);

        // Both events count as recorded at +500ms.
        assert_eq!(window.rate_at(start + Duration::from_millis(1400)), 2.0);
        assert_eq!(window.rate_at(start + Duration::from_millis(1500)), 0.0);
    }
}
