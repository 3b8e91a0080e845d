//! Cache key composition and tenant prefix math.
//!
//! Keys compose as `tenant:namespace:logical[:qualifier]`. The separator is
//! reserved: segments are sanitized so a hostile tenant id cannot escape its
//! prefix, which keeps tenant isolation structural rather than advisory.

use sha2::{Digest, Sha256};

const SEPARATOR: char = ':';

/// A structured cache key scoped to a tenant and namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    tenant: String,
    namespace: String,
    logical: String,
    qualifier: Option<String>,
}

impl CacheKey {
    pub fn new(
        tenant: impl AsRef<str>,
        namespace: impl AsRef<str>,
        logical: impl AsRef<str>,
    ) -> Self {
        Self {
            tenant: sanitize_segment(tenant.as_ref()),
            namespace: sanitize_segment(namespace.as_ref()),
            logical: sanitize_segment(logical.as_ref()),
            qualifier: None,
        }
    }

    /// Content-addressable key: the logical segment is a digest of the
    /// content, so identical content collapses to one entry per
    /// tenant/namespace.
    pub fn for_content(
        tenant: impl AsRef<str>,
        namespace: impl AsRef<str>,
        content: &str,
    ) -> Self {
        Self::new(tenant, namespace, content_digest(content))
    }

    pub fn with_qualifier(mut self, qualifier: impl AsRef<str>) -> Self {
        self.qualifier = Some(sanitize_segment(qualifier.as_ref()));
        self
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// The composed string form used by both tiers
    pub fn composed(&self) -> String {
        match &self.qualifier {
            Some(qualifier) => format!(
                "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
                self.tenant, self.namespace, self.logical, qualifier
            ),
            None => format!(
                "{}{SEPARATOR}{}{SEPARATOR}{}",
                self.tenant, self.namespace, self.logical
            ),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.composed())
    }
}

/// Compose a key from raw segments
pub fn compose(tenant: &str, namespace: &str, logical: &str) -> String {
    CacheKey::new(tenant, namespace, logical).composed()
}

/// The prefix every key of a tenant within a namespace starts with.
/// Bulk-clear operations match on this and can therefore never touch
/// another tenant's keys.
pub fn tenant_prefix(tenant: &str, namespace: &str) -> String {
    format!(
        "{}{SEPARATOR}{}{SEPARATOR}",
        sanitize_segment(tenant),
        sanitize_segment(namespace)
    )
}

/// Hex SHA-256 digest of content, used for content-addressable keys
pub fn content_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

fn sanitize_segment(segment: &str) -> String {
    segment.replace(SEPARATOR, "_")
}
