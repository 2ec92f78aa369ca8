use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Script};
use tokio::time::timeout;
use tracing::{debug, info};

use super::types::{AdmissionResult, Policy, StoreError, WindowStore};

/// Sliding window admission check, run atomically inside Redis.
///
/// Expires events older than the window, counts what is left, and records
/// the new event only when the window still has room. Because the whole
/// step is one script, two concurrent callers can never both take the last
/// slot. Members carry a random suffix so admissions within the same
/// second stay distinct.
///
/// KEYS[1] = rate limit key
/// ARGV[1] = limit
/// ARGV[2] = window (seconds)
/// ARGV[3] = current timestamp (epoch seconds)
///
/// Returns: {allowed (0 or 1), count in window after the check}
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local now = tonumber(ARGV[3])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)

local count = redis.call('ZCARD', key)
local allowed = 0

if count < limit then
    redis.call('ZADD', key, now, now .. ':' .. math.random())
    redis.call('EXPIRE', key, window)
    allowed = 1
    count = count + 1
end

return {allowed, count}
"#;

/// Connection settings for the shared store
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis connection URL
    pub url: String,
    /// Budget for a single admission check round trip
    pub command_timeout: Duration,
    /// Budget for establishing the initial connection
    pub connect_timeout: Duration,
}

/// Redis-backed window store, shared across service instances.
///
/// All instances pointing at the same Redis see one combined window per
/// key, so limits hold fleet-wide.
pub struct SharedWindowStore {
    connection: ConnectionManager,
    script: Script,
    command_timeout: Duration,
}

impl SharedWindowStore {
    /// Connect to the shared store and verify it answers.
    ///
    /// Bounded by the connect timeout so a dead Redis cannot stall startup.
    pub async fn connect(config: &RedisStoreConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str())?;
        let connection = timeout(config.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(config.connect_timeout))??;

        let store = Self {
            connection,
            script: Script::new(SLIDING_WINDOW_SCRIPT),
            command_timeout: config.command_timeout,
        };
        store.ping().await?;

        info!(url = %config.url, "connected to shared rate limit store");
        Ok(store)
    }

    /// Round trip a PING within the command timeout
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let cmd = redis::cmd("PING");
        let ping = cmd.query_async::<_, ()>(&mut connection);
        timeout(self.command_timeout, ping)
            .await
            .map_err(|_| StoreError::Timeout(self.command_timeout))??;
        Ok(())
    }
}

#[async_trait]
impl WindowStore for SharedWindowStore {
    async fn check(&self, key: &str, policy: Policy, now: u64) -> Result<AdmissionResult, StoreError> {
        // The manager multiplexes one connection; cloning the handle lets
        // checks run without a lock around the store.
        let mut connection = self.connection.clone();
        let mut script_invocation = self.script.key(key);
        script_invocation
            .arg(policy.limit)
            .arg(policy.window_secs)
            .arg(now);
        let invocation = script_invocation.invoke_async::<_, Vec<i64>>(&mut connection);

        let reply = timeout(self.command_timeout, invocation)
            .await
            .map_err(|_| StoreError::Timeout(self.command_timeout))??;

        if reply.len() != 2 {
            return Err(StoreError::Reply(format!(
                "expected [allowed, count], got {:?}",
                reply
            )));
        }

        let allowed = reply[0] == 1;
        let current_count = u32::try_from(reply[1].max(0)).unwrap_or(u32::MAX);
        let reset = now + policy.window_secs;

        let result = if allowed {
            AdmissionResult::admitted(policy.limit, current_count, reset)
        } else {
            AdmissionResult::denied(policy.limit, current_count, reset)
        };

        debug!(
            key,
            allowed = result.allowed,
            remaining = result.remaining,
            "shared store admission check"
        );
        Ok(result)
    }
}
