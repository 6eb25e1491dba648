//! Sliding window rate limit store.
//!
//! Every key owns the list of timestamps it was accepted at during the
//! trailing window. A check filters out expired stamps, compares the
//! survivors against the limit and appends `now` on accept. The window is
//! half-open: a stamp `ts` is still counted at `now` iff `ts > now - window`.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::key::RateLimitKey;
use crate::error::{GatehouseError, Result};

/// Accepted request timestamps for one key, oldest first.
pub type TimestampWindow = Vec<u64>;

/// Limiter settings. Fixed for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    window_secs: u64,
    max_requests: u32,
}

impl LimiterConfig {
    /// Validate and build a limiter configuration.
    ///
    /// A zero window or a zero capacity would silently disable limiting, so
    /// both are rejected.
    pub fn new(window_secs: u64, max_requests: u32) -> Result<Self> {
        if window_secs == 0 {
            return Err(GatehouseError::Config(
                "rate_limiting.window_secs must be greater than zero".to_string(),
            ));
        }
        if max_requests == 0 {
            return Err(GatehouseError::Config(
                "rate_limiting.max_requests must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            window_secs,
            max_requests,
        })
    }

    /// Length of the sliding window in seconds.
    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    /// Requests allowed per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }
}

/// Outcome of a single check against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Whether the request was accepted and recorded
    pub allowed: bool,
    /// Configured capacity per window
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// Seconds until the oldest counted request ages out
    pub reset_after: u64,
}

/// In-memory map from rate limit key to its timestamp window.
///
/// All reads and writes for one key go through the map's entry lock, so two
/// checks for the same key never interleave their read-modify-write.
pub struct SlidingWindowStore {
    config: LimiterConfig,
    windows: DashMap<RateLimitKey, TimestampWindow>,
}

impl SlidingWindowStore {
    /// Create an empty store.
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    /// The limiter settings this store enforces.
    pub fn config(&self) -> LimiterConfig {
        self.config
    }

    /// Check `key` at time `now` and record the request if it fits.
    pub fn check_and_update(&self, key: &RateLimitKey, now: u64) -> RateLimitStatus {
        let limit = self.config.max_requests;
        let window_secs = self.config.window_secs;

        match self.windows.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let window = occupied.get_mut();
                window.retain(|&ts| survives(ts, now, window_secs));

                if window.len() >= limit as usize {
                    let reset_after = reset_after(window[0], now, window_secs);
                    debug!(
                        key = %key,
                        count = window.len(),
                        limit = limit,
                        reset_after = reset_after,
                        "Rate limit exceeded"
                    );
                    return RateLimitStatus {
                        allowed: false,
                        limit,
                        remaining: 0,
                        reset_after,
                    };
                }

                // Keep the window non-decreasing even if the wall clock steps back.
                let stamp = window.last().map_or(now, |&last| last.max(now));
                window.push(stamp);

                let count = window.len() as u32;
                trace!(key = %key, count = count, "Request recorded");
                RateLimitStatus {
                    allowed: true,
                    limit,
                    remaining: limit - count,
                    reset_after: reset_after(window[0], now, window_secs),
                }
            }
            Entry::Vacant(vacant) => {
                trace!(key = %key, "Creating new sliding window");
                vacant.insert(vec![now]);
                RateLimitStatus {
                    allowed: true,
                    limit,
                    remaining: limit - 1,
                    reset_after: window_secs,
                }
            }
        }
    }

    /// Drop expired timestamps from every window and remove keys left empty.
    ///
    /// Returns the number of keys removed.
    pub fn prune(&self, now: u64) -> usize {
        let window_secs = self.config.window_secs;
        let mut removed = 0;

        self.windows.retain(|_, window| {
            window.retain(|&ts| survives(ts, now, window_secs));
            if window.is_empty() {
                removed += 1;
                false
            } else {
                true
            }
        });

        removed
    }

    /// Number of keys currently tracked.
    ///
    /// Inspection helper for tests and diagnostics; not used on the request path.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no keys are tracked.
    ///
    /// Inspection helper for tests and diagnostics; not used on the request path.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Number of stamps stored for `key`, before any expiry filtering.
    ///
    /// Inspection helper for tests and diagnostics; not used on the request path.
    pub fn window_len(&self, key: &RateLimitKey) -> Option<usize> {
        self.windows.get(key).map(|window| window.len())
    }

    /// Forget every key.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.windows.clear();
    }
}

/// `ts` is still inside the half-open window `(now - window_secs, now]`.
fn survives(ts: u64, now: u64, window_secs: u64) -> bool {
    ts.saturating_add(window_secs) > now
}

fn reset_after(oldest: u64, now: u64, window_secs: u64) -> u64 {
    window_secs.saturating_sub(now.saturating_sub(oldest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(window_secs: u64, max_requests: u32) -> SlidingWindowStore {
        SlidingWindowStore::new(LimiterConfig::new(window_secs, max_requests).unwrap())
    }

    fn key() -> RateLimitKey {
        RateLimitKey::ip("1.2.3.4", "/api/chat")
    }

    #[test]
    fn test_config_rejects_zero_values() {
        assert!(LimiterConfig::new(0, 10).is_err());
        assert!(LimiterConfig::new(10, 0).is_err());

        let config = LimiterConfig::new(10, 3).unwrap();
        assert_eq!(config.window_secs(), 10);
        assert_eq!(config.max_requests(), 3);
    }

    #[test]
    fn test_example_scenario() {
        let store = store(10, 3);
        let key = key();

        for (t, expected_remaining) in [(0, 2), (1, 1), (2, 0)] {
            let status = store.check_and_update(&key, t);
            assert!(status.allowed, "request at t={} should be accepted", t);
            assert_eq!(status.remaining, expected_remaining);
            assert_eq!(status.limit, 3);
        }

        let status = store.check_and_update(&key, 3);
        assert!(!status.allowed);
        assert_eq!(status.remaining, 0);
        assert_eq!(status.reset_after, 7);

        // At t=11 the stamps from t=0 and t=1 have both aged out.
        let status = store.check_and_update(&key, 11);
        assert!(status.allowed);
        assert_eq!(status.remaining, 1);
        assert_eq!(status.reset_after, 1);
    }

    #[test]
    fn test_rejects_after_limit_within_window() {
        let store = store(60, 5);
        let key = key();

        for _ in 0..5 {
            assert!(store.check_and_update(&key, 100).allowed);
        }

        // The 6th request should be rejected
        assert!(!store.check_and_update(&key, 100).allowed);
        assert!(!store.check_and_update(&key, 159).allowed);
    }

    #[test]
    fn test_full_window_expiry_restores_budget() {
        let store = store(10, 3);
        let key = key();

        for t in 0..3 {
            store.check_and_update(&key, t);
        }
        assert!(!store.check_and_update(&key, 5).allowed);

        let status = store.check_and_update(&key, 12);
        assert!(status.allowed);
        assert_eq!(status.remaining, 2);
    }

    #[test]
    fn test_half_open_boundary() {
        let store = store(10, 1);
        let key = key();

        assert!(store.check_and_update(&key, 50).allowed);
        assert!(!store.check_and_update(&key, 59).allowed);

        // Exactly oldest + window: the oldest stamp no longer counts.
        let status = store.check_and_update(&key, 60);
        assert!(status.allowed);
        assert_eq!(status.remaining, 0);
    }

    #[test]
    fn test_reset_after_tracks_oldest_survivor() {
        let store = store(10, 3);
        let key = key();

        let status = store.check_and_update(&key, 100);
        assert_eq!(status.reset_after, 10);

        let status = store.check_and_update(&key, 104);
        assert_eq!(status.reset_after, 6);
    }

    #[test]
    fn test_rejection_does_not_record() {
        let store = store(10, 2);
        let key = key();

        store.check_and_update(&key, 0);
        store.check_and_update(&key, 1);
        for t in 2..9 {
            assert!(!store.check_and_update(&key, t).allowed);
        }

        assert_eq!(store.window_len(&key), Some(2));
    }

    #[test]
    fn test_keys_have_independent_budgets() {
        let store = store(10, 1);
        let a = RateLimitKey::user("alice", "/api");
        let b = RateLimitKey::user("bob", "/api");

        assert!(store.check_and_update(&a, 0).allowed);
        assert!(store.check_and_update(&b, 0).allowed);
        assert!(!store.check_and_update(&a, 1).allowed);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_clock_step_back_keeps_window_ordered() {
        let store = store(10, 5);
        let key = key();

        store.check_and_update(&key, 100);
        store.check_and_update(&key, 95);

        let status = store.check_and_update(&key, 101);
        assert!(status.allowed);
        assert_eq!(status.remaining, 2);
    }

    #[test]
    fn test_concurrent_checks_never_overshoot_limit() {
        let store = &store(10, 50);
        let key = &key();

        let accepted: usize = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..16)
                .map(move |_| {
                    scope.spawn(move || {
                        (0..100)
                            .filter(|_| store.check_and_update(key, 1_000).allowed)
                            .count()
                    })
                })
                .collect();

            workers
                .into_iter()
                .map(|worker| worker.join().unwrap())
                .sum()
        });

        assert_eq!(accepted, 50);
        assert_eq!(store.window_len(key), Some(50));
    }

    #[test]
    fn test_prune_removes_idle_keys() {
        let store = store(10, 5);
        let idle = RateLimitKey::ip("9.9.9.9", "/api");
        let active = RateLimitKey::ip("8.8.8.8", "/api");

        store.check_and_update(&idle, 0);
        store.check_and_update(&active, 0);
        store.check_and_update(&active, 15);
        assert_eq!(store.len(), 2);

        let removed = store.prune(20);
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.window_len(&active), Some(1));
        assert_eq!(store.window_len(&idle), None);
    }

    #[test]
    fn test_inspection_helpers() {
        let store = store(10, 5);
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);

        store.clear();
        assert_eq!(store.len(), 0);

        store.check_and_update(&key(), 0);
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(store.is_empty());
    }
}
