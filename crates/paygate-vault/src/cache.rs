//! A generic, TTL-bounded, sharded-lock cache.
//!
//! Backs both the `CredentialCache` here and `TokenCache`/`RevocationRegistry`
//! in `paygate-core`. Built on [`dashmap::DashMap`] rather than a single
//! `RwLock<HashMap<..>>` so that no read blocks on a write to an
//! unrelated key.

use std::time::{Duration, Instant};

use dashmap::DashMap;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A concurrent map from `String` keys to values of type `V`, where every
/// entry carries an absolute expiry.
///
/// Entries are never returned once their expiry has passed, even if the
/// underlying map has not yet been swept.
pub struct TtlCache<V> {
    entries: DashMap<String, Entry<V>>,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> TtlCache<V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Look up a key. Returns `None` if absent or expired; an expired entry
    /// found during lookup is removed immediately.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        let hit = self.entries.get(key)?;
        if hit.expires_at <= Instant::now() {
            drop(hit);
            self.entries.remove(key);
            return None;
        }
        Some(hit.value.clone())
    }

    /// Insert or overwrite a key with the given time-to-live.
    pub fn put(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries.insert(
            key.into(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Remove a single key. Returns whether an entry was present.
    pub fn evict(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every key starting with `prefix`. Returns the number removed.
    ///
    /// Used to evict all `TokenCache` entries for a `clientId` when the key
    /// is `clientId` alone or `clientId+permissionSetHash`.
    pub fn evict_by_prefix(&self, prefix: &str) -> usize {
        let victims: Vec<String> = self
            .entries
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| k.starts_with(prefix))
            .collect();
        let count = victims.len();
        for key in victims {
            self.entries.remove(&key);
        }
        count
    }

    /// Number of live entries, including ones not yet swept past expiry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_returns_value() {
        let cache: TtlCache<u32> = TtlCache::new();
        cache.put("a", 1, Duration::from_secs(60));
        assert_eq!(cache.get("a"), Some(1));
    }

    #[test]
    fn expired_entry_is_not_returned() {
        let cache: TtlCache<u32> = TtlCache::new();
        cache.put("a", 1, Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn evict_by_prefix_only_removes_matching_keys() {
        let cache: TtlCache<u32> = TtlCache::new();
        cache.put("vendor_a", 1, Duration::from_secs(60));
        cache.put("vendor_a:perm_hash", 2, Duration::from_secs(60));
        cache.put("vendor_b", 3, Duration::from_secs(60));
        let removed = cache.evict_by_prefix("vendor_a");
        assert_eq!(removed, 2);
        assert_eq!(cache.get("vendor_b"), Some(3));
    }

    #[test]
    fn evict_removes_single_key() {
        let cache: TtlCache<u32> = TtlCache::new();
        cache.put("a", 1, Duration::from_secs(60));
        assert!(cache.evict("a"));
        assert!(!cache.evict("a"));
    }
}
