//! Per-source-IP token bucket (§4.11 "Enforces a per-source-IP token-bucket
//! rate limit").

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self { tokens: capacity, capacity, refill_per_sec, last_refill: Instant::now() }
    }

    fn try_take(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// One bucket per source IP, created lazily on first sight.
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    buckets: Mutex<HashMap<IpAddr, TokenBucket>>,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self { capacity: capacity as f64, refill_per_sec, buckets: Mutex::new(HashMap::new()) }
    }

    /// Default: 20 requests burst, sustained at roughly 1/s per IP.
    pub fn default_limits() -> Self {
        Self::new(20, 1.0)
    }

    pub fn allow(&self, source_ip: IpAddr) -> bool {
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        let bucket = buckets.entry(source_ip).or_insert_with(|| TokenBucket::new(self.capacity, self.refill_per_sec));
        bucket.try_take(Instant::now())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::default_limits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_within_capacity_is_allowed() {
        let limiter = RateLimiter::new(3, 0.0);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(limiter.allow(ip));
        assert!(limiter.allow(ip));
        assert!(limiter.allow(ip));
        assert!(!limiter.allow(ip));
    }

    #[test]
    fn different_ips_have_independent_buckets() {
        let limiter = RateLimiter::new(1, 0.0);
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(limiter.allow(a));
        assert!(!limiter.allow(a));
        assert!(limiter.allow(b));
    }

    #[test]
    fn refill_grants_a_token_after_enough_elapsed_time() {
        let mut bucket = TokenBucket::new(1.0, 1000.0);
        let now = Instant::now();
        assert!(bucket.try_take(now));
        assert!(!bucket.try_take(now));
        let later = now + Duration::from_millis(5);
        assert!(bucket.try_take(later));
    }
}
