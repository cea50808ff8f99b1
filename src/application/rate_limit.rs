//! Fixed-window rate limiting, keyed by caller identity.
//!
//! Deliberately not `governor` (a GCRA/leaky-bucket limiter): the design
//! calls for fixed-window counting — a window start plus a count that resets
//! when the window rolls over — which is simple enough to hand-roll and
//! behaves differently at window boundaries than a token bucket would.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::domain::errors::{CoreError, CoreResult};

struct Window {
    started_at: Instant,
    count: u32,
}

pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    max_store_size: usize,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(window_secs: u64, max_requests: u32, max_store_size: usize) -> Self {
        Self {
            window: Duration::from_secs(window_secs),
            max_requests,
            max_store_size,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Checks and increments `key`'s counter. Returns `RateLimited` with the
    /// seconds remaining in the current window if `key` is already at its
    /// cap.
    pub fn check(&self, key: &str) -> CoreResult<()> {
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");

        if windows.len() >= self.max_store_size && !windows.contains_key(key) {
            self.compact(&mut windows, now);
        }

        let entry = windows.entry(key.to_string()).or_insert_with(|| Window {
            started_at: now,
            count: 0,
        });

        if now.duration_since(entry.started_at) >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }

        if entry.count >= self.max_requests {
            let elapsed = now.duration_since(entry.started_at);
            let retry_after_secs = self.window.saturating_sub(elapsed).as_secs().max(1);
            return Err(CoreError::RateLimited { retry_after_secs });
        }

        entry.count += 1;
        Ok(())
    }

    /// Drops windows that have already rolled over, to bound memory when the
    /// caller population churns. Called only when the store is at capacity.
    /// If that alone doesn't bring the store back under `max_store_size`
    /// (every window still active), evicts the oldest entries until it does.
    fn compact(&self, windows: &mut HashMap<String, Window>, now: Instant) {
        windows.retain(|_, w| now.duration_since(w.started_at) < self.window);

        if windows.len() >= self.max_store_size {
            let mut by_age: Vec<(String, Instant)> = windows.iter().map(|(k, w)| (k.clone(), w.started_at)).collect();
            by_age.sort_by_key(|(_, started_at)| *started_at);
            let excess = windows.len() + 1 - self.max_store_size;
            for (key, _) in by_age.into_iter().take(excess) {
                windows.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn allows_up_to_the_configured_max_then_limits() {
        let limiter = RateLimiter::new(60, 2, 1000);
        assert!(limiter.check("caller-a").is_ok());
        assert!(limiter.check("caller-a").is_ok());
        assert!(matches!(limiter.check("caller-a"), Err(CoreError::RateLimited { .. })));
    }

    #[test]
    fn windows_are_independent_per_key() {
        let limiter = RateLimiter::new(60, 1, 1000);
        assert!(limiter.check("caller-a").is_ok());
        assert!(limiter.check("caller-b").is_ok());
    }

    #[test]
    fn window_resets_after_it_elapses() {
        let limiter = RateLimiter::new(1, 1, 1000);
        assert!(limiter.check("caller-a").is_ok());
        assert!(limiter.check("caller-a").is_err());
        sleep(Duration::from_millis(1100));
        assert!(limiter.check("caller-a").is_ok());
    }

    #[test]
    fn store_stays_bounded_under_sustained_distinct_callers() {
        let limiter = RateLimiter::new(60, 10, 4);
        for i in 0..50 {
            limiter.check(&format!("caller-{i}")).unwrap();
        }
        let windows = limiter.windows.lock().unwrap();
        assert!(windows.len() <= 4, "store grew to {} past max_store_size", windows.len());
    }
}
