//! Continuous-refill token bucket (§4.3: `capacity = rateLimitRpm`, `refill =
//! rateLimitRpm / 60s`).

use std::time::{Duration, Instant};

/// Mutable bucket state, refilled lazily on each check.
#[derive(Debug)]
pub(crate) struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub(crate) fn new(rpm: u32) -> Self {
        let capacity = rpm as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed <= 0.0 {
            return;
        }
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Attempts to take one token. Returns `true` on success.
    pub(crate) fn try_take(&mut self) -> bool {
        self.refill(Instant::now());
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until at least one token will be available, assuming no other
    /// caller drains it first.
    pub(crate) fn time_until_next_token(&mut self) -> Duration {
        self.refill(Instant::now());
        if self.tokens >= 1.0 {
            return Duration::ZERO;
        }
        let deficit = 1.0 - self.tokens;
        Duration::from_secs_f64(deficit / self.refill_per_sec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_full() {
        let mut b = TokenBucket::new(60);
        assert!(b.try_take());
    }

    #[test]
    fn exhausts_then_refills() {
        // rpm = 6000 -> 100 tokens/sec, so 50ms refills ~5 tokens.
        let mut b = TokenBucket::new(6000);
        for _ in 0..6000 {
            assert!(b.try_take());
        }
        assert!(!b.try_take());
        std::thread::sleep(Duration::from_millis(50));
        assert!(b.try_take());
    }

    #[test]
    fn reports_wait_time_when_empty() {
        let mut b = TokenBucket::new(60);
        for _ in 0..60 {
            b.try_take();
        }
        let wait = b.time_until_next_token();
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_secs(1));
    }
}
