use std::time::Duration;

use async_trait::async_trait;
use redis::RedisError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rate limit policy for one endpoint class
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Policy {
    /// Maximum number of requests admitted per window
    pub limit: u32,
    /// Length of the sliding window (in seconds)
    pub window_secs: u64,
}

impl Policy {
    /// Create a new policy
    pub const fn new(limit: u32, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }

    /// Get the window as a Duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Outcome of a single admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionResult {
    /// Whether the request was admitted
    pub allowed: bool,
    /// The policy limit that was applied
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// Absolute epoch second at which a denied caller can expect room again
    pub reset_epoch_secs: u64,
    /// Requests counted in the window, including this one when admitted
    pub current_count: u32,
}

impl AdmissionResult {
    /// Create an admitted result
    pub fn admitted(limit: u32, current_count: u32, reset_epoch_secs: u64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: limit.saturating_sub(current_count),
            reset_epoch_secs,
            current_count,
        }
    }

    /// Create a denied result
    pub fn denied(limit: u32, current_count: u32, reset_epoch_secs: u64) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: limit.saturating_sub(current_count),
            reset_epoch_secs,
            current_count,
        }
    }

    /// Seconds a denied caller should wait before retrying
    pub fn retry_after(&self, now: u64) -> u64 {
        self.reset_epoch_secs.saturating_sub(now)
    }
}

/// Errors a window store can fail with. These never reach the end caller;
/// the service falls back to the local store and logs them.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store command failed: {0}")]
    Command(#[from] RedisError),

    #[error("store command timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected reply from store: {0}")]
    Reply(String),
}

impl StoreError {
    /// Stable label for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            StoreError::Command(_) => "command",
            StoreError::Timeout(_) => "timeout",
            StoreError::Reply(_) => "reply",
        }
    }
}

/// Contract shared by the window store backends.
///
/// A check is one atomic step: expire events older than the window, count
/// what is left, and record the new event only when the count is still
/// under the limit. Denied checks must not be recorded.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Run one admission check for `key` at `now` (epoch seconds)
    async fn check(&self, key: &str, policy: Policy, now: u64) -> Result<AdmissionResult, StoreError>;
}
