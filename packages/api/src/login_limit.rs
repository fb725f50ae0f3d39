// ABOUTME: Sliding-window limiter for login attempts
// ABOUTME: Per-IP counters, reset when the window elapses

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    count: u32,
    window_start: Instant,
}

/// Tracks per-IP login attempt counts within a fixed window. Denials
/// report how long the caller should wait before retrying.
pub struct LoginRateLimiter {
    entries: Mutex<HashMap<String, Entry>>,
    limit: u32,
    window: Duration,
}

impl LoginRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            limit,
            window,
        }
    }

    /// Check whether the given IP may attempt a login. Returns
    /// `(allowed, retry_after_seconds)`.
    pub fn allow(&self, ip: &str) -> (bool, u64) {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("login limiter mutex poisoned");

        let entry = entries.entry(ip.to_string()).or_insert(Entry {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count >= self.limit {
            let remaining = self.window - now.duration_since(entry.window_start);
            let retry_after = remaining.as_secs().max(1);
            return (false, retry_after);
        }

        entry.count += 1;
        (true, 0)
    }

    /// Drop entries whose window has expired. Called opportunistically by
    /// a background task.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("login limiter mutex poisoned");
        entries.retain(|_, entry| now.duration_since(entry.window_start) < self.window);
    }
}
