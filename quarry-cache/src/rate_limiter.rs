//! Rate limiters for the sync work queue
//!
//! A rate limiter decides how long a key has to wait before it is handed to a
//! worker again after a failed sync. Limiters compose: the default one takes
//! the longer of a per-key exponential backoff and an overall token bucket, so
//! one job that keeps failing neither hammers the backend nor starves others.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

pub trait RateLimiter: Send + Sync {
    /// How long `key` should wait before being processed again
    fn when(&self, key: &str) -> Duration;

    /// Stops tracking `key`, resetting any backoff
    fn forget(&self, key: &str);

    /// Number of times `key` has been rate limited since it was last forgotten
    fn retries(&self, key: &str) -> u32;
}

/// Per-key exponential backoff: `base * 2^failures`, capped at `max`
pub struct ExponentialBackoffLimiter {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<String, u32>>,
}

impl ExponentialBackoffLimiter {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }
}

impl RateLimiter for ExponentialBackoffLimiter {
    fn when(&self, key: &str) -> Duration {
        let mut failures = self.failures.lock().expect("rate limiter mutex poisoned");
        let count = failures.entry(key.to_string()).or_insert(0);
        let exp = *count;
        *count = count.saturating_add(1);

        1u32.checked_shl(exp)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |backoff| backoff.min(self.max))
    }

    fn forget(&self, key: &str) {
        self.failures
            .lock()
            .expect("rate limiter mutex poisoned")
            .remove(key);
    }

    fn retries(&self, key: &str) -> u32 {
        self.failures
            .lock()
            .expect("rate limiter mutex poisoned")
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

struct Bucket {
    tokens: f64,
    last_update: Instant,
}

/// Overall token bucket shared by every key
///
/// Each call reserves a token, possibly one that only becomes available in the
/// future, and returns how long to wait for it.
pub struct TokenBucketLimiter {
    rate_per_sec: f64,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

impl TokenBucketLimiter {
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        let capacity = f64::from(burst);
        Self {
            rate_per_sec,
            capacity,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_update: Instant::now(),
            }),
        }
    }
}

impl RateLimiter for TokenBucketLimiter {
    fn when(&self, _key: &str) -> Duration {
        let mut bucket = self.bucket.lock().expect("rate limiter mutex poisoned");
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_update).as_secs_f64();

        bucket.tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        bucket.last_update = now;
        bucket.tokens -= 1.0;

        if bucket.tokens >= 0.0 || self.rate_per_sec <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-bucket.tokens / self.rate_per_sec)
        }
    }

    fn forget(&self, _key: &str) {}

    fn retries(&self, _key: &str) -> u32 {
        0
    }
}

/// Waits as long as the slowest of its limiters
pub struct MaxOfLimiter {
    limiters: Vec<Arc<dyn RateLimiter>>,
}

impl MaxOfLimiter {
    pub fn new(limiters: Vec<Arc<dyn RateLimiter>>) -> Self {
        Self { limiters }
    }
}

impl RateLimiter for MaxOfLimiter {
    fn when(&self, key: &str) -> Duration {
        self.limiters
            .iter()
            .map(|l| l.when(key))
            .max()
            .unwrap_or(Duration::ZERO)
    }

    fn forget(&self, key: &str) {
        for limiter in &self.limiters {
            limiter.forget(key);
        }
    }

    fn retries(&self, key: &str) -> u32 {
        self.limiters
            .iter()
            .map(|l| l.retries(key))
            .max()
            .unwrap_or(0)
    }
}

/// Per-key backoff from 5ms to 1000s, bounded by 10 qps overall (burst 100)
pub fn default_controller_rate_limiter() -> Arc<dyn RateLimiter> {
    Arc::new(MaxOfLimiter::new(vec![
        Arc::new(ExponentialBackoffLimiter::new(
            Duration::from_millis(5),
            Duration::from_secs(1000),
        )),
        Arc::new(TokenBucketLimiter::new(10.0, 100)),
    ]))
}
