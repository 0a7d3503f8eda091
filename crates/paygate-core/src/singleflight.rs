//! Per-clientId single-flight guard.
//!
//! "Only one vault fetch per clientId is in-flight at a time" is a REQUIRED
//! optimization, not an incidental one: concurrent cache misses for the
//! same client must coalesce into a single vault round-trip. Implemented
//! as a sharded `DashMap` of per-key mutexes rather than one global lock,
//! so an unrelated clientId's fetch never waits.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

/// Hands out a per-key `tokio::sync::Mutex<()>`, created lazily and shared
/// by all callers currently contending on that key.
pub struct SingleFlight {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Default for SingleFlight {
    fn default() -> Self {
        Self::new()
    }
}

impl SingleFlight {
    #[must_use]
    pub fn new() -> Self {
        Self { locks: DashMap::new() }
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Run `f` while holding the per-key lock. Callers racing on the same
    /// key serialize; callers on different keys never contend, and the
    /// registry itself never blocks a read of an unrelated key since
    /// `DashMap` shards its internal locking.
    pub async fn run<T, F, Fut>(&self, key: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;
        f().await
    }
}
