// ABOUTME: Token-bucket limiter keyed by arbitrary string identifiers
// ABOUTME: Injectable clock for deterministic tests; one mutex guards all buckets

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Time source for the limiter. Production uses [`SystemClock`]; tests
/// substitute a controllable implementation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Token state for a single key.
struct Bucket {
    tokens: f64,
    last_refill: DateTime<Utc>,
    rate: i32,
}

/// Token-bucket rate limiter. Each key gets `rate` requests per `window`,
/// where `rate` is either the per-key override or the default.
pub struct Limiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    default_rate: i32,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl Limiter {
    pub fn new(default_rate: i32, window: Duration) -> Self {
        Self::with_clock(default_rate, window, Arc::new(SystemClock))
    }

    pub fn with_clock(default_rate: i32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            default_rate,
            window,
            clock,
        }
    }

    fn effective_rate(&self, custom_rate: i32) -> i32 {
        if custom_rate > 0 {
            custom_rate
        } else {
            self.default_rate
        }
    }

    /// Check whether a request identified by `key` is permitted, consuming
    /// one token when it is. A positive `custom_rate` overrides the default
    /// rate for this key.
    pub fn allow(&self, key: &str, custom_rate: i32) -> bool {
        let rate = self.effective_rate(custom_rate);
        let now = self.clock.now();

        let mut buckets = self.buckets.lock().expect("limiter mutex poisoned");
        let bucket = get_bucket(&mut buckets, key, rate, now);
        refill(bucket, now, self.window);

        if bucket.tokens < 1.0 {
            return false;
        }
        bucket.tokens -= 1.0;
        true
    }

    /// Current rate-limit state for `key`: the maximum token count, the
    /// tokens left (floored), and the time at which the bucket will be
    /// fully replenished.
    pub fn status(&self, key: &str, custom_rate: i32) -> (i32, i32, DateTime<Utc>) {
        let rate = self.effective_rate(custom_rate);
        let now = self.clock.now();

        let mut buckets = self.buckets.lock().expect("limiter mutex poisoned");
        let bucket = get_bucket(&mut buckets, key, rate, now);
        refill(bucket, now, self.window);

        let remaining = (bucket.tokens as i32).max(0);

        let deficit = rate as f64 - bucket.tokens;
        let reset_at = if deficit <= 0.0 {
            now
        } else {
            let refill_rate = rate as f64 / self.window.as_secs_f64();
            now + ChronoDuration::milliseconds((deficit / refill_rate * 1000.0) as i64)
        };

        (rate, remaining, reset_at)
    }
}

/// Fetch or lazily create the bucket for `key`. The rate is overwritten on
/// every access so configuration changes take effect immediately.
fn get_bucket<'a>(
    buckets: &'a mut HashMap<String, Bucket>,
    key: &str,
    rate: i32,
    now: DateTime<Utc>,
) -> &'a mut Bucket {
    let bucket = buckets.entry(key.to_string()).or_insert_with(|| Bucket {
        tokens: rate as f64,
        last_refill: now,
        rate,
    });
    bucket.rate = rate;
    bucket
}

/// Add tokens for the time elapsed since the last refill, clamped to the
/// bucket's rate.
fn refill(bucket: &mut Bucket, now: DateTime<Utc>, window: Duration) {
    let elapsed = (now - bucket.last_refill).num_milliseconds() as f64 / 1000.0;
    if elapsed <= 0.0 {
        return;
    }
    let refill_rate = bucket.rate as f64 / window.as_secs_f64();
    bucket.tokens = (bucket.tokens + elapsed * refill_rate).min(bucket.rate as f64);
    bucket.last_refill = now;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Controllable time source for deterministic tests.
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(Utc::now()),
            })
        }

        pub fn advance(&self, d: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += ChronoDuration::from_std(d).unwrap();
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    const MINUTE: Duration = Duration::from_secs(60);

    fn test_limiter(rate: i32, clock: Arc<ManualClock>) -> Limiter {
        Limiter::with_clock(rate, MINUTE, clock)
    }

    #[test]
    fn allow_basic() {
        let clock = ManualClock::new();
        let limiter = test_limiter(3, clock);

        for i in 0..3 {
            assert!(limiter.allow("agent-1", 0), "request {} should pass", i + 1);
        }
        assert!(!limiter.allow("agent-1", 0), "4th request should be denied");
    }

    #[test]
    fn keys_have_independent_buckets() {
        let clock = ManualClock::new();
        let limiter = test_limiter(1, clock);

        assert!(limiter.allow("a", 0));
        assert!(!limiter.allow("a", 0));
        assert!(limiter.allow("b", 0));
    }

    #[test]
    fn tokens_refill_with_elapsed_time() {
        let clock = ManualClock::new();
        // 60 tokens per minute = 1 token per second.
        let limiter = test_limiter(60, clock.clone());

        for _ in 0..60 {
            limiter.allow("k", 0);
        }
        assert!(!limiter.allow("k", 0));

        clock.advance(Duration::from_secs(1));
        assert!(limiter.allow("k", 0));
        assert!(!limiter.allow("k", 0));

        clock.advance(Duration::from_secs(5));
        for i in 0..5 {
            assert!(limiter.allow("k", 0), "request {} after 5s refill", i + 1);
        }
        assert!(!limiter.allow("k", 0));
    }

    #[test]
    fn refill_caps_at_rate() {
        let clock = ManualClock::new();
        let limiter = test_limiter(5, clock.clone());

        limiter.allow("k", 0);
        limiter.allow("k", 0);
        clock.advance(Duration::from_secs(600));

        let (_, remaining, _) = limiter.status("k", 0);
        assert_eq!(remaining, 5);
    }

    #[test]
    fn custom_rate_overrides_default() {
        let cases = [
            ("custom higher than default", 2, 5, 5),
            ("custom lower than default", 10, 3, 3),
            ("zero custom uses default", 5, 0, 5),
        ];
        for (name, default_rate, custom, want_allowed) in cases {
            let clock = ManualClock::new();
            let limiter = test_limiter(default_rate, clock);
            let mut allowed = 0;
            for _ in 0..want_allowed + 2 {
                if limiter.allow("key", custom) {
                    allowed += 1;
                }
            }
            assert_eq!(allowed, want_allowed, "{name}");
        }
    }

    #[test]
    fn concurrent_access_consumes_exactly_rate_tokens() {
        let clock = ManualClock::new();
        let limiter = Arc::new(test_limiter(100, clock));

        let handles: Vec<_> = (0..200)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || limiter.allow("concurrent", 0))
            })
            .collect();

        let allowed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(allowed, 100);
    }

    #[test]
    fn status_reports_limit_and_remaining() {
        let clock = ManualClock::new();
        let limiter = test_limiter(10, clock.clone());

        let (limit, remaining, _) = limiter.status("s", 0);
        assert_eq!(limit, 10);
        assert_eq!(remaining, 10);

        limiter.allow("s", 0);
        limiter.allow("s", 0);
        limiter.allow("s", 0);

        let (limit, remaining, reset_at) = limiter.status("s", 0);
        assert_eq!(limit, 10);
        assert_eq!(remaining, 7);
        assert!(reset_at > clock.now());
    }

    #[test]
    fn status_uses_custom_rate() {
        let clock = ManualClock::new();
        let limiter = test_limiter(10, clock);

        let (limit, remaining, _) = limiter.status("s", 20);
        assert_eq!(limit, 20);
        assert_eq!(remaining, 20);
    }

    #[test]
    fn full_bucket_resets_now() {
        let clock = ManualClock::new();
        let limiter = test_limiter(5, clock.clone());

        let (_, _, reset_at) = limiter.status("full", 0);
        assert_eq!(reset_at, clock.now());
    }

    #[test]
    fn tokens_stay_within_bounds_under_arbitrary_schedules() {
        let clock = ManualClock::new();
        let limiter = test_limiter(7, clock.clone());

        // Interleave allows and time advances; remaining must stay in [0, 7].
        for step in 0..200 {
            if step % 3 == 0 {
                clock.advance(Duration::from_secs(step % 11));
            }
            limiter.allow("k", 0);
            let (limit, remaining, _) = limiter.status("k", 0);
            assert!(remaining >= 0 && remaining <= limit);
        }
    }
}
