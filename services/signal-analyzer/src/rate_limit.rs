//! Rolling request counter
//!
//! Caps outbound calls per key (`market_data`, `assessment`) within a fixed
//! window. Shared by every analysis in the process; not distributed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::RateLimitConfig;

pub const MARKET_DATA_KEY: &str = "market_data";
pub const ASSESSMENT_KEY: &str = "assessment";

/// Cleanup interval in seconds
const CLEANUP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone)]
struct RequestBucket {
    requests: u32,
    window_start: Instant,
}

/// In-memory rolling-window counter, cheap to clone
#[derive(Clone)]
pub struct RequestCounter {
    buckets: Arc<RwLock<HashMap<String, RequestBucket>>>,
    window: Duration,
    max_requests: u32,
    last_cleanup: Arc<RwLock<Instant>>,
}

impl RequestCounter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            buckets: Arc::new(RwLock::new(HashMap::new())),
            window,
            max_requests,
            last_cleanup: Arc::new(RwLock::new(Instant::now())),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(Duration::from_secs(config.window_secs), config.max_requests)
    }

    /// Record a request for `key` if the window still has room
    pub async fn check(&self, key: &str) -> bool {
        let mut buckets = self.buckets.write().await;
        let now = Instant::now();

        let should_cleanup = {
            let last = self.last_cleanup.read().await;
            now.duration_since(*last) >= Duration::from_secs(CLEANUP_INTERVAL_SECS)
        };
        if should_cleanup {
            let before = buckets.len();
            buckets.retain(|_, bucket| now.duration_since(bucket.window_start) < self.window);
            let evicted = before.saturating_sub(buckets.len());
            if evicted > 0 {
                debug!("Request counter: evicted {} expired buckets", evicted);
            }
            *self.last_cleanup.write().await = now;
        }

        match buckets.get_mut(key) {
            Some(bucket) => {
                if now.duration_since(bucket.window_start) >= self.window {
                    bucket.requests = 1;
                    bucket.window_start = now;
                    true
                } else if bucket.requests < self.max_requests {
                    bucket.requests += 1;
                    true
                } else {
                    false
                }
            }
            None => {
                buckets.insert(
                    key.to_string(),
                    RequestBucket {
                        requests: 1,
                        window_start: now,
                    },
                );
                true
            }
        }
    }

    /// Requests counted for `key` in the current window
    pub async fn usage(&self, key: &str) -> u32 {
        let buckets = self.buckets.read().await;
        match buckets.get(key) {
            Some(bucket) if bucket.window_start.elapsed() < self.window => bucket.requests,
            _ => 0,
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }
}

impl Default for RequestCounter {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}
