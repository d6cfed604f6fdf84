//! Mount state (spec §3, §9 "Global mutable mount state"): an explicit
//! handle carried through every entry point, never a process-global
//! singleton. Owns the mount list/map, the atomically-swappable exports and
//! netgroups snapshots, and the auth cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;

use crate::auth_cache::AuthCache;
use crate::error::CoreError;
use crate::exports::ExportsFile;
use crate::mount_auth::HostSpecTable;
use crate::netgroups::NetgroupsFile;
use crate::rmtab::Rmtab;

/// Export-name (path as the client requested it), peer hostname, and the
/// full resolved path when it differs (subdirectory mount).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub export_name: String,
    pub hostname: String,
    pub full_path: Option<String>,
}

impl MountEntry {
    pub fn key(&self) -> String {
        format!("{}:{}", self.export_name.trim_start_matches('/'), self.hostname)
    }
}

#[derive(Default)]
struct MountListState {
    list: Vec<MountEntry>,
    map: HashMap<String, usize>,
}

impl MountListState {
    fn reindex(&mut self) {
        self.map.clear();
        for (i, e) in self.list.iter().enumerate() {
            self.map.insert(e.key(), i);
        }
    }

    fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }
}

pub struct MountState {
    list: Mutex<MountListState>,
    exports: ArcSwap<ExportsFile>,
    netgroups: ArcSwap<NetgroupsFile>,
    auth_cache: Arc<AuthCache>,
    hostspecs: Arc<HostSpecTable>,
    pub export_volumes: bool,
    pub export_dirs: bool,
    stop: Arc<AtomicBool>,
}

impl MountState {
    /// `hostspecs` comes from config (`nfs3.<vol>.export-dir` restrictions),
    /// not from the hot-reloadable exports/netgroups files, so it is plain
    /// `Arc` rather than `ArcSwap`.
    pub fn new(
        exports: ExportsFile,
        netgroups: NetgroupsFile,
        hostspecs: HostSpecTable,
        auth_cache_ttl: Duration,
        export_volumes: bool,
        export_dirs: bool,
    ) -> Self {
        MountState {
            list: Mutex::new(MountListState::default()),
            exports: ArcSwap::from_pointee(exports),
            netgroups: ArcSwap::from_pointee(netgroups),
            auth_cache: Arc::new(AuthCache::new(auth_cache_ttl)),
            hostspecs: Arc::new(hostspecs),
            export_volumes,
            export_dirs,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn exports(&self) -> Arc<ExportsFile> {
        self.exports.load_full()
    }

    pub fn netgroups(&self) -> Arc<NetgroupsFile> {
        self.netgroups.load_full()
    }

    pub fn auth_cache(&self) -> &AuthCache {
        &self.auth_cache
    }

    pub fn hostspecs(&self) -> &HostSpecTable {
        &self.hostspecs
    }

    /// Atomic test-and-set of the exports/netgroups snapshots; readers that
    /// already copied the old `Arc` keep it alive until they drop it.
    pub fn swap_files(&self, exports: ExportsFile, netgroups: NetgroupsFile) {
        self.exports.store(Arc::new(exports));
        self.netgroups.store(Arc::new(netgroups));
    }

    /// Adds `entry` if no entry with the same (export, host) exists.
    /// Returns whether it was newly added. Persists via `rmtab`'s
    /// lock-read-merge-write-unlock protocol before committing in memory.
    pub async fn add_mount(&self, rmtab: &Rmtab, entry: MountEntry) -> Result<bool, CoreError> {
        let mut guard = self.list.lock().await;
        if guard.contains(&entry.key()) {
            return Ok(false);
        }
        let in_memory = guard.list.clone();
        let to_add = entry.clone();
        let result = rmtab.persist_change(&in_memory, move |mut merged| {
            let key = to_add.key();
            if !merged.iter().any(|e| e.key() == key) {
                merged.push(to_add);
            }
            merged
        })?;
        guard.list = result;
        guard.reindex();
        Ok(true)
    }

    /// Removes the first entry matching `(export_name, hostname)`. Returns
    /// whether an entry was removed.
    pub async fn remove_mount(&self, rmtab: &Rmtab, export_name: &str, hostname: &str) -> Result<bool, CoreError> {
        let mut guard = self.list.lock().await;
        let existed = guard
            .list
            .iter()
            .any(|e| e.export_name == export_name && e.hostname == hostname);
        if !existed {
            return Ok(false);
        }
        let in_memory = guard.list.clone();
        let export_name = export_name.to_string();
        let hostname = hostname.to_string();
        let result = rmtab.persist_change(&in_memory, move |mut merged| {
            if let Some(pos) = merged
                .iter()
                .position(|e| e.export_name == export_name && e.hostname == hostname)
            {
                merged.remove(pos);
            }
            merged
        })?;
        guard.list = result;
        guard.reindex();
        Ok(true)
    }

    pub async fn remove_all_for_host(&self, rmtab: &Rmtab, hostname: &str) -> Result<(), CoreError> {
        let mut guard = self.list.lock().await;
        let in_memory = guard.list.clone();
        let hostname_owned = hostname.to_string();
        let result = rmtab.persist_change(&in_memory, move |merged| {
            merged.into_iter().filter(|e| e.hostname != hostname_owned).collect()
        })?;
        guard.list = result;
        guard.reindex();
        Ok(())
    }

    pub async fn snapshot(&self) -> Vec<MountEntry> {
        self.list.lock().await.list.clone()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}
