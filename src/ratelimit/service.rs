use tracing::{info, warn};

use super::local::LocalWindowStore;
use super::redis::{RedisStoreConfig, SharedWindowStore};
use super::types::{AdmissionResult, Policy, WindowStore};

/// Admission checks over a shared store with a local fallback.
///
/// When the shared store errors or times out, the check silently degrades
/// to the in-process store for that one call. Callers always get an
/// answer; a broken Redis slows nothing down past the command timeout and
/// never turns into a 5xx.
pub struct RateLimiterService {
    shared: Option<Box<dyn WindowStore>>,
    local: LocalWindowStore,
}

impl RateLimiterService {
    /// Build a service backed only by the in-process store
    pub fn local_only() -> Self {
        Self {
            shared: None,
            local: LocalWindowStore::new(),
        }
    }

    /// Build a service from an already-connected shared store.
    /// The local store still backs it up when a check fails.
    pub fn with_shared_store(store: Box<dyn WindowStore>) -> Self {
        Self {
            shared: Some(store),
            local: LocalWindowStore::new(),
        }
    }

    /// Connect to the shared store described by `config`.
    ///
    /// A store that cannot be reached is not fatal: the service starts in
    /// local-only mode and logs the degradation.
    pub async fn with_redis(config: &RedisStoreConfig) -> Self {
        match SharedWindowStore::connect(config).await {
            Ok(store) => Self::with_shared_store(Box::new(store)),
            Err(e) => {
                warn!(
                    error = %e,
                    "shared rate limit store unavailable, continuing with local store only"
                );
                Self::local_only()
            }
        }
    }

    /// Run one admission check for `key` at `now` (epoch seconds)
    pub async fn check(&self, key: &str, policy: Policy, now: u64) -> AdmissionResult {
        if let Some(shared) = &self.shared {
            match shared.check(key, policy, now).await {
                Ok(result) => return result,
                Err(e) => {
                    warn!(
                        key,
                        error = %e,
                        "shared store check failed, falling back to local store"
                    );
                    crate::metrics::record_store_fallback(e.reason());
                }
            }
        }
        self.local.check(key, policy, now)
    }

    /// Which backend answers checks when everything is healthy
    pub fn backend_name(&self) -> &'static str {
        if self.shared.is_some() {
            "redis"
        } else {
            "local"
        }
    }

    /// Log the active backend at startup
    pub fn log_backend(&self) {
        info!(backend = self.backend_name(), "rate limiter ready");
    }

    #[cfg(test)]
    pub fn local(&self) -> &LocalWindowStore {
        &self.local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::types::StoreError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Shared store double that fails every check
    struct FailingStore {
        calls: AtomicU32,
    }

    impl FailingStore {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl WindowStore for FailingStore {
        async fn check(
            &self,
            _key: &str,
            _policy: Policy,
            _now: u64,
        ) -> Result<AdmissionResult, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Reply("injected failure".to_string()))
        }
    }

    #[tokio::test]
    async fn test_local_only_enforces_policy() {
        let service = RateLimiterService::local_only();
        let policy = Policy::new(2, 60);

        assert!(service.check("k", policy, 0).await.allowed);
        assert!(service.check("k", policy, 0).await.allowed);
        assert!(!service.check("k", policy, 0).await.allowed);
        assert_eq!(service.backend_name(), "local");
    }

    #[tokio::test]
    async fn test_failing_shared_store_falls_back_per_check() {
        let service = RateLimiterService::with_shared_store(Box::new(FailingStore::new()));
        let policy = Policy::new(2, 60);

        // Checks never error out; the local store answers and keeps
        // enforcing the policy.
        assert!(service.check("k", policy, 0).await.allowed);
        assert!(service.check("k", policy, 0).await.allowed);
        let result = service.check("k", policy, 0).await;
        assert!(!result.allowed);
        assert_eq!(result.remaining, 0);

        // Every check recorded in the fallback store, not lost.
        assert_eq!(service.local().active_keys(), 1);
        assert_eq!(service.backend_name(), "redis");
    }

    #[tokio::test]
    async fn test_shared_store_answers_when_healthy() {
        // The local store impl doubles as a healthy shared store here.
        let service = RateLimiterService::with_shared_store(Box::new(LocalWindowStore::new()));
        let policy = Policy::new(1, 60);

        assert!(service.check("k", policy, 0).await.allowed);
        assert!(!service.check("k", policy, 0).await.allowed);

        // Nothing fell back, so the service's own local store stays empty.
        assert_eq!(service.local().active_keys(), 0);
    }
}
