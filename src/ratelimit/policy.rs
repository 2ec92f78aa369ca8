use std::collections::HashMap;

use tracing::debug;

use super::types::Policy;

/// Immutable mapping from endpoint class to rate limit policy.
///
/// Built once at startup from configuration. Lookups for classes that were
/// never configured fall back to the default policy, so adding a route
/// without a policy entry degrades to coarse limiting instead of failing.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    endpoints: HashMap<String, Policy>,
    default_policy: Policy,
    global: Policy,
}

impl PolicyTable {
    /// Create a policy table
    pub fn new(endpoints: HashMap<String, Policy>, default_policy: Policy, global: Policy) -> Self {
        Self {
            endpoints,
            default_policy,
            global,
        }
    }

    /// Look up the policy for an endpoint class
    pub fn policy_for(&self, class: &str) -> Policy {
        match self.endpoints.get(class) {
            Some(policy) => *policy,
            None => {
                debug!(class, "no policy for endpoint class, using default");
                self.default_policy
            }
        }
    }

    /// The service-wide policy applied across all endpoint classes
    pub fn global(&self) -> Policy {
        self.global
    }

    /// The fallback policy for unclassified endpoints
    pub fn default_policy(&self) -> Policy {
        self.default_policy
    }

    /// Number of explicitly configured endpoint classes
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether any endpoint class is explicitly configured
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
