//! `RevocationRegistry`.

use std::time::Duration;

use paygate_vault::TtlCache;

/// Set of revoked `jti` values, each retained for its original remaining
/// lifetime.
pub struct RevocationRegistry {
    revoked: TtlCache<()>,
}

impl Default for RevocationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RevocationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { revoked: TtlCache::new() }
    }

    pub fn revoke(&self, jti: &str, remaining_lifetime: Duration) {
        self.revoked.put(jti, (), remaining_lifetime);
    }

    #[must_use]
    pub fn is_revoked(&self, jti: &str) -> bool {
        self.revoked.get(jti).is_some()
    }
}
