//! Quote providers
//!
//! Each provider implements [`QuoteProvider`](crate::types::QuoteProvider)
//! and keeps its own [`HealthTracker`] so health checks never cost an API call.

pub mod alphavantage;
pub mod terminal_bridge;

pub use alphavantage::AlphaVantageClient;
pub use terminal_bridge::TerminalBridgeClient;

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::SourceHealth;

/// Internal health tracking for API-free health checks
#[derive(Debug, Default)]
pub struct HealthTracker {
    /// Timestamp of last successful request (millis since epoch)
    last_success_ms: AtomicU64,
    /// Timestamp of last failed request (millis since epoch)
    last_failure_ms: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    last_latency_ms: AtomicU64,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, latency_ms: u64) {
        let now_ms = Utc::now().timestamp_millis() as u64;
        self.last_success_ms.store(now_ms, Ordering::Relaxed);
        self.last_latency_ms.store(latency_ms, Ordering::Relaxed);
        self.success_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        let now_ms = Utc::now().timestamp_millis() as u64;
        self.last_failure_ms.store(now_ms, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Healthy if at least one success and no failure since
    pub fn is_healthy(&self) -> bool {
        let last_success = self.last_success_ms.load(Ordering::Relaxed);
        let last_failure = self.last_failure_ms.load(Ordering::Relaxed);
        last_success > 0 && (last_failure == 0 || last_success >= last_failure)
    }

    pub fn success_rate(&self) -> f64 {
        let successes = self.success_count.load(Ordering::Relaxed);
        let failures = self.failure_count.load(Ordering::Relaxed);
        let total = successes + failures;
        if total == 0 {
            return 1.0; // No requests yet, assume healthy
        }
        successes as f64 / total as f64
    }

    /// Build a health report for the named source
    pub fn snapshot(&self, source: &str) -> SourceHealth {
        let last_success_ms = self.last_success_ms.load(Ordering::Relaxed);
        let last_success = if last_success_ms > 0 {
            DateTime::from_timestamp_millis(last_success_ms as i64)
        } else {
            None
        };
        let is_healthy = self.is_healthy();
        let has_failures = self.failure_count.load(Ordering::Relaxed) > 0;

        SourceHealth {
            source: source.to_string(),
            is_healthy,
            last_success,
            last_error: if !is_healthy && has_failures {
                Some("Recent failures detected".to_string())
            } else {
                None
            },
            success_rate: self.success_rate(),
            last_latency_ms: self.last_latency_ms.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_tracker_is_not_yet_healthy() {
        let tracker = HealthTracker::new();
        assert!(!tracker.is_healthy());
        assert_eq!(tracker.success_rate(), 1.0);
        assert!(tracker.snapshot("x").last_error.is_none());
    }

    #[test]
    fn test_success_then_failure() {
        let tracker = HealthTracker::new();
        tracker.record_success(12);
        assert!(tracker.is_healthy());

        std::thread::sleep(std::time::Duration::from_millis(2));
        tracker.record_failure();
        assert!(!tracker.is_healthy());
        assert_eq!(tracker.success_rate(), 0.5);

        let health = tracker.snapshot("terminal_bridge");
        assert_eq!(health.source, "terminal_bridge");
        assert_eq!(health.last_latency_ms, 12);
        assert!(health.last_error.is_some());
    }
}
