//! Rate limit key derivation.

use std::fmt;
use uuid::Uuid;

/// Prefix shared by every rate limit key.
pub const KEY_PREFIX: &str = "ratelimit";

/// A key that uniquely identifies one tenant's request window.
///
/// The key is derived only from the tenant id, so the same tenant always
/// maps to the same key and distinct tenants never share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    /// Build the key for a tenant: `ratelimit:{tenant_id}`.
    pub fn for_tenant(tenant_id: &Uuid) -> Self {
        Self(format!("{}:{}", KEY_PREFIX, tenant_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
