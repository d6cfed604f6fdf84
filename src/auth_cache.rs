//! Auth Cache (spec §4.D): a TTL-bound mapping from
//! `export-uuid:mount-uuid:host` to the export item that granted access.
//!
//! `moka::sync::Cache` with `time_to_live` supplies the inline-expiry and
//! concurrent-access semantics the original hand-rolled with a refcounted
//! dict under a mutex; wrapping the cached value in `Arc` stands in for
//! that refcount (clone-on-read, drop-on-evict).

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use crate::exports::ExportItem;
use crate::hash::Uuid;

#[derive(Debug, Clone)]
pub struct AuthCacheEntry {
    pub item: Arc<ExportItem>,
}

pub struct AuthCache {
    cache: Cache<String, AuthCacheEntry>,
}

impl AuthCache {
    pub fn new(ttl: Duration) -> Self {
        AuthCache {
            cache: Cache::builder().time_to_live(ttl).build(),
        }
    }

    pub fn make_key(export_uuid: &Uuid, mount_uuid: &Uuid, host: &str) -> String {
        format!("{}:{}:{}", hex(export_uuid), hex(mount_uuid), host)
    }

    /// Returns the live entry, or `None` on miss/expiry. Moka evicts expired
    /// entries inline, so a `None` here already satisfies "no lookup returns
    /// an entry with timestamp + ttl < now()" (invariant 4).
    pub fn lookup(&self, export_uuid: &Uuid, mount_uuid: &Uuid, host: &str) -> Option<AuthCacheEntry> {
        self.cache.get(&Self::make_key(export_uuid, mount_uuid, host))
    }

    /// Idempotent: a live entry already present is left untouched.
    pub fn insert(&self, export_uuid: &Uuid, mount_uuid: &Uuid, host: &str, item: Arc<ExportItem>) {
        let key = Self::make_key(export_uuid, mount_uuid, host);
        if self.cache.contains_key(&key) {
            return;
        }
        self.cache.insert(key, AuthCacheEntry { item });
    }

    /// Atomic swap to empty plus a synchronous drain, so callers that need
    /// purge to have observably completed (the revalidation task) can rely
    /// on it.
    pub fn purge(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }

    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn hex(bytes: &Uuid) -> String {
    let mut s = String::with_capacity(32);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}
