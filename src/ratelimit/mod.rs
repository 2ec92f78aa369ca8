//! Request admission control
//!
//! Sliding-window rate limiting over per-caller, per-endpoint-class keys.
//! Both backends run the same algorithm: drop events older than the
//! window, count what is left, and record the new event only when the
//! count is under the limit.
//!
//! # Features
//!
//! - Shared Redis backend so limits hold across service instances
//! - In-process fallback when the shared store is unreachable
//! - Per-endpoint-class policies plus one service-wide guard
//! - Rate limit headers on every admitted and denied response
//!
//! An admitted request consumes its slot the moment the check records it,
//! whether or not the handler finishes.
//!
//! # Example
//!
//! ```rust,no_run
//! use apiguard::ratelimit::{Policy, RateLimiterService};
//!
//! #[tokio::main]
//! async fn main() {
//!     // Local-only service; use with_redis for a shared backend.
//!     let service = RateLimiterService::local_only();
//!
//!     let policy = Policy::new(20, 300);
//!     let result = service.check("ratelimit:ask:1f7a", policy, 1_700_000_000).await;
//!     assert!(result.allowed);
//! }
//! ```

pub mod key;
pub mod local;
pub mod middleware;
pub mod policy;
pub mod redis;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use self::key::{client_address, derive_key};
pub use self::local::LocalWindowStore;
pub use self::middleware::{admission_guard, global_guard, GuardContext};
pub use self::policy::PolicyTable;
pub use self::redis::{RedisStoreConfig, SharedWindowStore};
pub use self::service::RateLimiterService;
pub use self::types::{AdmissionResult, Policy, StoreError, WindowStore};
