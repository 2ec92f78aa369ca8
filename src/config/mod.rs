use crate::error::{GuardError, Result};
use crate::ratelimit::policy::PolicyTable;
use crate::ratelimit::redis::RedisStoreConfig;
use crate::ratelimit::types::Policy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Shared store connection; absent means local-only rate limiting
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    /// Rate limit policies
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Shared store connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
    /// Budget for one admission check round trip (milliseconds)
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Budget for the initial connection (milliseconds)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Rate limit policies by endpoint class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitsConfig {
    /// Service-wide policy checked for every request
    #[serde(default = "default_global_policy")]
    pub global: Policy,
    /// Policy for endpoint classes with no entry of their own
    #[serde(default = "default_fallback_policy")]
    pub default: Policy,
    /// Per-endpoint-class policies
    #[serde(default = "default_endpoint_policies")]
    pub endpoints: HashMap<String, Policy>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_command_timeout_ms() -> u64 {
    50
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_global_policy() -> Policy {
    Policy::new(1000, 3600)
}

fn default_fallback_policy() -> Policy {
    Policy::new(60, 60)
}

fn default_endpoint_policies() -> HashMap<String, Policy> {
    HashMap::from([
        ("health".to_string(), Policy::new(100, 60)),
        ("analytics_summary".to_string(), Policy::new(30, 60)),
        ("analytics".to_string(), Policy::new(10, 60)),
        ("users".to_string(), Policy::new(5, 60)),
        ("ask".to_string(), Policy::new(20, 300)),
        ("execute".to_string(), Policy::new(10, 300)),
        ("roadmaps".to_string(), Policy::new(3, 300)),
    ])
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            global: default_global_policy(),
            default: default_fallback_policy(),
            endpoints: default_endpoint_policies(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            redis: None,
            rate_limits: RateLimitsConfig::default(),
        }
    }
}

impl RedisConfig {
    /// Convert to the store's connection settings
    pub fn store_config(&self) -> RedisStoreConfig {
        RedisStoreConfig {
            url: self.url.clone(),
            command_timeout: Duration::from_millis(self.command_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }
}

impl RateLimitsConfig {
    /// Build the immutable policy table the guards consult
    pub fn policy_table(&self) -> PolicyTable {
        PolicyTable::new(self.endpoints.clone(), self.default, self.global)
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GuardError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GuardError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(redis) = &self.redis {
            if !redis.url.starts_with("redis://") && !redis.url.starts_with("rediss://") {
                return Err(GuardError::Config(format!(
                    "Redis URL must start with redis:// or rediss://, got: {}",
                    redis.url
                )));
            }
            if redis.command_timeout_ms == 0 {
                return Err(GuardError::Config(
                    "Redis command timeout must be > 0".to_string(),
                ));
            }
            if redis.connect_timeout_ms == 0 {
                return Err(GuardError::Config(
                    "Redis connect timeout must be > 0".to_string(),
                ));
            }
        }

        validate_policy("global", &self.rate_limits.global)?;
        validate_policy("default", &self.rate_limits.default)?;
        for (class, policy) in &self.rate_limits.endpoints {
            validate_policy(class, policy)?;
        }

        Ok(())
    }
}

fn validate_policy(class: &str, policy: &Policy) -> Result<()> {
    if policy.limit == 0 {
        return Err(GuardError::Config(format!(
            "Rate limit must be > 0 for endpoint class: {}",
            class
        )));
    }
    if policy.window_secs == 0 {
        return Err(GuardError::Config(format!(
            "Rate limit window must be > 0 for endpoint class: {}",
            class
        )));
    }
    Ok(())
}
