use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Expired buckets are dropped once every this many checks.
const SWEEP_EVERY: u64 = 1024;

struct Bucket {
    count: u32,
    window_start: Instant,
}

/// Fixed-window request counter keyed by an arbitrary client key.
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    max_requests: u32,
    window: Duration,
    checks: AtomicU64,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            buckets: DashMap::new(),
            max_requests,
            window: Duration::from_secs(window_secs),
            checks: AtomicU64::new(0),
        }
    }

    /// Counts one request for `key`; false once the window's budget is spent.
    pub fn check(&self, key: &str) -> bool {
        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep();
        }

        let mut entry = self.buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            count: 0,
            window_start: Instant::now(),
        });

        if entry.window_start.elapsed() > self.window {
            entry.count = 0;
            entry.window_start = Instant::now();
        }
        if entry.count >= self.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }

    /// Drops every bucket whose window has passed.
    pub fn sweep(&self) {
        let window = self.window;
        self.buckets.retain(|_, b| b.window_start.elapsed() <= window);
    }
}
