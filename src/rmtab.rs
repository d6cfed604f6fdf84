//! Mount Registry persistence (spec §4.F): the `rmtab` key/value text file
//! shared across co-tenant processes via an advisory file lock.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::warn;

use crate::error::CoreError;
use crate::mount_state::MountEntry;

const MAX_VALUE_LEN: usize = 1024;

pub struct Rmtab {
    path: Option<PathBuf>,
}

impl Rmtab {
    pub fn new(path: Option<PathBuf>) -> Self {
        Rmtab { path }
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn read(&self) -> Result<Vec<MountEntry>, CoreError> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = OpenOptions::new().read(true).open(path)?;
        file.lock_shared()?;
        let contents = fs::read_to_string(path)?;
        FileExt::unlock(&file)?;
        Ok(parse_entries(&contents))
    }

    /// Runs the full add/remove protocol (spec §4.F "Persistence
    /// protocol"): lock, read-and-union-merge with `in_memory`, apply
    /// `change`, write-to-temp-then-rename, unlock. When no rmtab path is
    /// configured, only `change` over `in_memory` is applied.
    pub fn persist_change<F>(&self, in_memory: &[MountEntry], change: F) -> Result<Vec<MountEntry>, CoreError>
    where
        F: FnOnce(Vec<MountEntry>) -> Vec<MountEntry>,
    {
        let Some(path) = &self.path else {
            return Ok(change(in_memory.to_vec()));
        };

        // Opened only to hold the advisory lock; contents are read/written separately.
        #[allow(clippy::suspicious_open_options)]
        let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
        file.lock_exclusive()?;
        let on_disk = parse_entries(&fs::read_to_string(path).unwrap_or_default());
        let merged = union_merge(in_memory.to_vec(), on_disk);
        let result = change(merged);
        let write_result = write_atomic(path, &format_entries(&result));
        FileExt::unlock(&file)?;
        write_result?;
        Ok(result)
    }

    /// Path-migration rewrite (spec §4.F "Rewrite on path migration"): locks
    /// old then new, unions both plus `in_memory` into the new path, then
    /// returns the rmtab pointing at the new path. On failure to open the
    /// new path, the caller should keep the existing `Rmtab` active.
    pub fn migrate(&self, new_path: PathBuf, in_memory: &[MountEntry]) -> Result<Rmtab, CoreError> {
        let old_entries = match &self.path {
            Some(old_path) => {
                #[allow(clippy::suspicious_open_options)]
                let old_file = OpenOptions::new().read(true).write(true).create(true).open(old_path)?;
                old_file.lock_exclusive()?;
                let entries = parse_entries(&fs::read_to_string(old_path).unwrap_or_default());
                FileExt::unlock(&old_file)?;
                entries
            }
            None => Vec::new(),
        };

        #[allow(clippy::suspicious_open_options)]
        let new_file = OpenOptions::new().read(true).write(true).create(true).open(&new_path)?;
        new_file.lock_exclusive()?;
        let new_entries = parse_entries(&fs::read_to_string(&new_path).unwrap_or_default());
        let union = union_merge(union_merge(in_memory.to_vec(), old_entries), new_entries);
        let write_result = write_atomic(&new_path, &format_entries(&union));
        FileExt::unlock(&new_file)?;
        write_result?;

        Ok(Rmtab::new(Some(new_path)))
    }
}

fn union_merge(a: Vec<MountEntry>, b: Vec<MountEntry>) -> Vec<MountEntry> {
    let mut out = a;
    for e in b {
        if !out.iter().any(|x| x.key() == e.key()) {
            out.push(e);
        }
    }
    out
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), CoreError> {
    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);
    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn format_entries(entries: &[MountEntry]) -> String {
    let mut out = String::new();
    for (i, e) in entries.iter().enumerate() {
        let mountpoint = e.full_path.as_deref().unwrap_or(&e.export_name);
        out.push_str(&format!("hostname-{i} = {}\n", e.hostname));
        out.push_str(&format!("mountpoint-{i} = {mountpoint}\n"));
    }
    out
}

fn parse_entries(contents: &str) -> Vec<MountEntry> {
    let mut hosts: HashMap<usize, String> = HashMap::new();
    let mut mounts: HashMap<usize, String> = HashMap::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if value.len() > MAX_VALUE_LEN {
            warn!(key, "rmtab value exceeds max length, rejecting entry");
            continue;
        }
        if let Some(n) = key.strip_prefix("hostname-") {
            if let Ok(n) = n.parse::<usize>() {
                hosts.insert(n, value.to_string());
            }
        } else if let Some(n) = key.strip_prefix("mountpoint-") {
            if let Ok(n) = n.parse::<usize>() {
                mounts.insert(n, value.to_string());
            }
        }
    }

    let mut entries = Vec::new();
    let mut n = 0;
    while let (Some(host), Some(mountpoint)) = (hosts.get(&n), mounts.get(&n)) {
        entries.push(MountEntry {
            export_name: mountpoint.clone(),
            hostname: host.clone(),
            full_path: None,
        });
        n += 1;
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(export: &str, host: &str) -> MountEntry {
        MountEntry {
            export_name: export.to_string(),
            hostname: host.to_string(),
            full_path: None,
        }
    }

    #[test]
    fn empty_rmtab_round_trips_in_memory_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rmtab");
        let rmtab = Rmtab::new(Some(path.clone()));
        let result = rmtab
            .persist_change(&[], |mut m| {
                m.push(entry("/vol0", "h1"));
                m
            })
            .unwrap();
        assert_eq!(result, vec![entry("/vol0", "h1")]);
        assert_eq!(rmtab.read().unwrap(), vec![entry("/vol0", "h1")]);
    }

    #[test]
    fn write_then_read_over_empty_rmtab_yields_same_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rmtab");
        let rmtab = Rmtab::new(Some(path));
        let state = vec![entry("/vol0", "h1"), entry("/vol1", "h2"), entry("/vol0", "h3")];
        let written = rmtab.persist_change(&[], |_| state.clone()).unwrap();
        assert_eq!(written, state);
        let read_back = rmtab.read().unwrap();
        assert_eq!(read_back.len(), state.len());
        for e in &state {
            assert!(read_back.contains(e));
        }
    }

    #[test]
    fn disabled_rmtab_only_touches_in_memory() {
        let rmtab = Rmtab::new(None);
        let result = rmtab
            .persist_change(&[entry("/vol0", "h1")], |mut m| {
                m.push(entry("/vol0", "h2"));
                m
            })
            .unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn concurrent_writer_entries_are_unioned() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rmtab");
        let rmtab = Rmtab::new(Some(path.clone()));
        rmtab
            .persist_change(&[], |mut m| {
                m.push(entry("/vol0", "h1"));
                m
            })
            .unwrap();

        // Simulate a second process appending directly to the file.
        let existing = fs::read_to_string(&path).unwrap();
        fs::write(&path, format!("{existing}hostname-1 = h2\nmountpoint-1 = /vol0\n")).unwrap();

        let result = rmtab.persist_change(&[entry("/vol0", "h1")], |m| m).unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn migration_unions_old_and_new_paths() {
        let dir = tempdir().unwrap();
        let old_path = dir.path().join("rmtab.old");
        let new_path = dir.path().join("rmtab.new");
        let old = Rmtab::new(Some(old_path));
        old.persist_change(&[], |mut m| {
            m.push(entry("/vol0", "h1"));
            m
        })
        .unwrap();

        let migrated = old.migrate(new_path.clone(), &[entry("/vol0", "h1")]).unwrap();
        let entries = migrated.read().unwrap();
        assert_eq!(entries, vec![entry("/vol0", "h1")]);
    }
}
