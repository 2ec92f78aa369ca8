use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::types::{AdmissionResult, Policy, StoreError, WindowStore};

/// How often the store scans for fully-expired keys (in seconds)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Timestamps recorded for one key, oldest first
struct KeyWindow {
    stamps: VecDeque<u64>,
    /// Window the key was last checked with, kept for the sweep
    window_secs: u64,
}

/// In-process window store.
///
/// Keeps a ring of admitted-event timestamps per key and slides the window
/// on every check. Used as the only backend in single-instance deployments
/// and as the fallback when the shared store is unreachable. Counts are
/// per-process, so admissions during a fallback are looser across a fleet
/// but never unbounded.
pub struct LocalWindowStore {
    windows: DashMap<String, KeyWindow>,
    last_sweep: AtomicU64,
    sweep_interval_secs: u64,
}

impl LocalWindowStore {
    /// Create a store with the default sweep interval
    pub fn new() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL_SECS)
    }

    /// Create a store that sweeps at a custom interval
    pub fn with_sweep_interval(sweep_interval_secs: u64) -> Self {
        Self {
            windows: DashMap::new(),
            last_sweep: AtomicU64::new(0),
            sweep_interval_secs,
        }
    }

    /// Run one admission check for `key` at `now` (epoch seconds).
    ///
    /// The whole step runs under the key's map entry lock, so concurrent
    /// checks on one key serialize and admissions never exceed the limit.
    pub fn check(&self, key: &str, policy: Policy, now: u64) -> AdmissionResult {
        self.maybe_sweep(now);

        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| KeyWindow {
                stamps: VecDeque::new(),
                window_secs: policy.window_secs,
            });
        let window = entry.value_mut();
        window.window_secs = policy.window_secs;

        // Events at exactly now - window have aged out.
        if let Some(cutoff) = now.checked_sub(policy.window_secs) {
            while let Some(&oldest) = window.stamps.front() {
                if oldest > cutoff {
                    break;
                }
                window.stamps.pop_front();
            }
        }

        let count = window.stamps.len() as u32;
        let reset = now + policy.window_secs;

        if count < policy.limit {
            window.stamps.push_back(now);
            AdmissionResult::admitted(policy.limit, count + 1, reset)
        } else {
            AdmissionResult::denied(policy.limit, count, reset)
        }
    }

    /// Evict keys whose every recorded event has expired.
    ///
    /// Runs at most once per sweep interval; the check that wins the CAS
    /// does the work so no background task is needed.
    fn maybe_sweep(&self, now: u64) {
        let last = self.last_sweep.load(Ordering::Relaxed);
        if now.saturating_sub(last) < self.sweep_interval_secs {
            return;
        }
        if self
            .last_sweep
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        let before = self.windows.len();
        self.windows.retain(|_, window| {
            match (window.stamps.back(), now.checked_sub(window.window_secs)) {
                (Some(&newest), Some(cutoff)) => newest > cutoff,
                (Some(_), None) => true,
                (None, _) => false,
            }
        });

        let evicted = before.saturating_sub(self.windows.len());
        if evicted > 0 {
            debug!(evicted, active = self.windows.len(), "swept expired rate limit keys");
        }
        crate::metrics::record_local_active_keys(self.windows.len());
    }

    /// Number of keys currently tracked (for testing/monitoring)
    pub fn active_keys(&self) -> usize {
        self.windows.len()
    }
}

impl Default for LocalWindowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WindowStore for LocalWindowStore {
    async fn check(&self, key: &str, policy: Policy, now: u64) -> Result<AdmissionResult, StoreError> {
        Ok(LocalWindowStore::check(self, key, policy, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_window_slides_over_time() {
        let store = LocalWindowStore::new();
        let policy = Policy::new(3, 60);

        // Four checks one second apart against a limit of three.
        let expected = [true, true, true, false];
        let expected_remaining = [2, 1, 0, 0];
        for (now, (&allowed, &remaining)) in
            expected.iter().zip(expected_remaining.iter()).enumerate()
        {
            let result = store.check("k", policy, now as u64);
            assert_eq!(result.allowed, allowed, "check at t={}", now);
            assert_eq!(result.remaining, remaining, "remaining at t={}", now);
            assert_eq!(result.reset_epoch_secs, now as u64 + 60);
        }
    }

    #[test]
    fn test_expired_events_free_the_window() {
        let store = LocalWindowStore::new();
        let policy = Policy::new(3, 60);

        for now in 0..3 {
            assert!(store.check("k", policy, now).allowed);
        }
        assert!(!store.check("k", policy, 3).allowed);

        // At t=61 the event from t=0 has aged out (0 <= 61 - 60).
        let result = store.check("k", policy, 61);
        assert!(result.allowed);
        assert_eq!(result.current_count, 3);
    }

    #[test]
    fn test_event_expires_exactly_at_window_edge() {
        let store = LocalWindowStore::new();
        let policy = Policy::new(1, 60);

        assert!(store.check("k", policy, 0).allowed);
        assert!(!store.check("k", policy, 59).allowed);
        assert!(store.check("k", policy, 60).allowed);
    }

    #[test]
    fn test_denied_checks_are_not_recorded() {
        let store = LocalWindowStore::new();
        let policy = Policy::new(2, 60);

        assert!(store.check("k", policy, 10).allowed);
        assert!(store.check("k", policy, 10).allowed);

        // Hammering a full window must not extend it.
        for _ in 0..20 {
            let result = store.check("k", policy, 10);
            assert!(!result.allowed);
            assert_eq!(result.current_count, 2);
        }

        // Both recorded events expire together, so the window frees fully.
        let result = store.check("k", policy, 71);
        assert!(result.allowed);
        assert_eq!(result.current_count, 1);
    }

    #[test]
    fn test_zero_limit_always_denies() {
        let store = LocalWindowStore::new();
        let policy = Policy::new(0, 60);

        let result = store.check("k", policy, 100);
        assert!(!result.allowed);
        assert_eq!(result.remaining, 0);
        assert_eq!(result.current_count, 0);
    }

    #[test]
    fn test_keys_are_independent() {
        let store = LocalWindowStore::new();
        let policy = Policy::new(2, 60);

        assert!(store.check("a", policy, 0).allowed);
        assert!(store.check("a", policy, 0).allowed);
        assert!(!store.check("a", policy, 0).allowed);

        assert!(store.check("b", policy, 0).allowed);
        assert_eq!(store.active_keys(), 2);
    }

    #[test]
    fn test_sweep_evicts_only_fully_expired_keys() {
        // Interval large enough that the setup checks never sweep.
        let store = LocalWindowStore::with_sweep_interval(1000);
        let policy = Policy::new(3, 60);

        store.check("stale", policy, 100);
        store.check("fresh", policy, 960);
        assert_eq!(store.active_keys(), 2);

        // The check at t=1010 sweeps: cutoff is 950, so the stale key
        // (newest event 100) goes away and the fresh one (960) stays.
        store.check("trigger", policy, 1010);
        assert_eq!(store.active_keys(), 2);
        assert!(store.windows.get("stale").is_none());
        assert!(store.windows.get("fresh").is_some());
        assert!(store.windows.get("trigger").is_some());
    }

    #[test]
    fn test_concurrent_checks_admit_exactly_limit() {
        let store = Arc::new(LocalWindowStore::new());
        let policy = Policy::new(50, 60);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let mut admitted = 0;
                    for _ in 0..25 {
                        if store.check("shared", policy, 1000).allowed {
                            admitted += 1;
                        }
                    }
                    admitted
                })
            })
            .collect();

        let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 50);
    }

    #[test]
    fn test_remaining_counts_down_monotonically() {
        let store = LocalWindowStore::new();
        let policy = Policy::new(5, 60);

        let mut last = policy.limit;
        for _ in 0..5 {
            let result = store.check("k", policy, 42);
            assert!(result.allowed);
            assert!(result.remaining < last);
            assert!(result.current_count <= policy.limit);
            last = result.remaining;
        }
        assert_eq!(last, 0);
    }
}
