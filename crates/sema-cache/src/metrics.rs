//! Rolling search metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of response-time samples retained in the sliding window
pub const DEFAULT_SAMPLE_WINDOW: usize = 100;

/// Point-in-time view of the collected metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Backend calls attempted
    pub attempts: u64,
    /// Backend calls that returned a usable result
    pub successes: u64,
    /// Searches that had to serve a degraded/fallback result
    pub fallbacks: u64,
    /// Logical searches served, cached or not
    pub total_searches: u64,
    /// Rolling average over the bounded sample window, in milliseconds
    pub avg_response_time_ms: f64,
    /// Ratio of cache hits to lookups, in `[0.0, 1.0]`
    pub cache_hit_ratio: f64,
}

/// Monotonic counters plus a bounded window of recent response times
///
/// Every recording method is infallible: a poisoned window lock is
/// recovered rather than propagated, so metrics can never take down the
/// request path they observe. Counters reset only on explicit operator
/// action via [`SearchMetrics::reset`].
pub struct SearchMetrics {
    attempts: AtomicU64,
    successes: AtomicU64,
    fallbacks: AtomicU64,
    total_searches: AtomicU64,
    cache_hit_ratio_bits: AtomicU64,
    samples: Mutex<VecDeque<Duration>>,
    window_size: usize,
}

impl SearchMetrics {
    /// Create a collector with the default sample window
    pub fn new() -> Self {
        Self::with_window(DEFAULT_SAMPLE_WINDOW)
    }

    /// Create a collector retaining at most `window_size` latency samples
    pub fn with_window(window_size: usize) -> Self {
        Self {
            attempts: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            total_searches: AtomicU64::new(0),
            cache_hit_ratio_bits: AtomicU64::new(0f64.to_bits()),
            samples: Mutex::new(VecDeque::with_capacity(window_size)),
            window_size: window_size.max(1),
        }
    }

    /// Record one backend call attempt
    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one successful backend call
    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one fallback invocation
    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one logical search
    pub fn record_search(&self) {
        self.total_searches.fetch_add(1, Ordering::Relaxed);
    }

    /// Push a response-time sample, dropping the oldest past the window
    pub fn record_response_time(&self, elapsed: Duration) {
        let mut samples = match self.samples.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if samples.len() == self.window_size {
            samples.pop_front();
        }
        samples.push_back(elapsed);
    }

    /// Overwrite the cache-hit ratio
    pub fn set_cache_hit_ratio(&self, ratio: f64) {
        self.cache_hit_ratio_bits
            .store(ratio.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Rolling average over the retained samples, in milliseconds
    pub fn average_response_time_ms(&self) -> f64 {
        let samples = match self.samples.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if samples.is_empty() {
            return 0.0;
        }
        let total: Duration = samples.iter().sum();
        total.as_secs_f64() * 1000.0 / samples.len() as f64
    }

    /// Take a consistent-enough snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            total_searches: self.total_searches.load(Ordering::Relaxed),
            avg_response_time_ms: self.average_response_time_ms(),
            cache_hit_ratio: f64::from_bits(
                self.cache_hit_ratio_bits.load(Ordering::Relaxed),
            ),
        }
    }

    /// Zero every counter and drop all samples
    pub fn reset(&self) {
        self.attempts.store(0, Ordering::Relaxed);
        self.successes.store(0, Ordering::Relaxed);
        self.fallbacks.store(0, Ordering::Relaxed);
        self.total_searches.store(0, Ordering::Relaxed);
        self.cache_hit_ratio_bits
            .store(0f64.to_bits(), Ordering::Relaxed);
        match self.samples.lock() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl Default for SearchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = SearchMetrics::new();
        metrics.record_attempt();
        metrics.record_attempt();
        metrics.record_success();
        metrics.record_fallback();
        metrics.record_search();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.attempts, 2);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.fallbacks, 1);
        assert_eq!(snapshot.total_searches, 1);
    }

    #[test]
    fn test_window_bounds_the_average() {
        let metrics = SearchMetrics::with_window(50);

        // 150 samples of increasing latency: 1ms, 2ms, ..., 150ms. Only the
        // last 50 (101..=150, average 125.5ms) may influence the average.
        for ms in 1..=150u64 {
            metrics.record_response_time(Duration::from_millis(ms));
        }

        let avg = metrics.average_response_time_ms();
        assert!((avg - 125.5).abs() < 0.01, "avg was {avg}");
    }

    #[test]
    fn test_average_empty_window_is_zero() {
        let metrics = SearchMetrics::new();
        assert_eq!(metrics.average_response_time_ms(), 0.0);
    }

    #[test]
    fn test_cache_hit_ratio_is_clamped() {
        let metrics = SearchMetrics::new();
        metrics.set_cache_hit_ratio(1.7);
        assert_eq!(metrics.snapshot().cache_hit_ratio, 1.0);

        metrics.set_cache_hit_ratio(0.25);
        assert_eq!(metrics.snapshot().cache_hit_ratio, 0.25);
    }

    #[test]
    fn test_reset_clears_everything() {
        let metrics = SearchMetrics::new();
        metrics.record_attempt();
        metrics.record_search();
        metrics.record_response_time(Duration::from_millis(10));
        metrics.set_cache_hit_ratio(0.9);

        metrics.reset();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.attempts, 0);
        assert_eq!(snapshot.total_searches, 0);
        assert_eq!(snapshot.avg_response_time_ms, 0.0);
        assert_eq!(snapshot.cache_hit_ratio, 0.0);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let metrics = SearchMetrics::new();
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert!(json.get("totalSearches").is_some());
        assert!(json.get("avgResponseTimeMs").is_some());
    }
}
