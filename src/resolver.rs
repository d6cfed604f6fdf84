//! Mount Resolver (spec §4.G): turns a mount request into a file handle by
//! walking the volume inode-by-inode, following symlinks, and deriving the
//! mount-uuid from the authorized (not necessarily requested) path.
//!
//! Expressed as a sequential `async fn` over the external `Vfs` trait, not
//! a hand-chained callback state machine (spec §9 "Coroutine-style
//! resolver") — cancellation is simply the future being dropped.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::error::WireError;
use crate::exports::ExportsFile;
use crate::hash;
use crate::mount_auth::{self, AuthOutcome, FileHandle, ReverseResolver};
use crate::mount_state::{MountEntry, MountState};
use crate::netgroups::NetgroupsFile;
use crate::rmtab::Rmtab;
use crate::vfs::{Inode, Vfs, VfsError};

/// State machine of a mount (spec §4.G): `none -> connected -> authorized
/// -> resolving -> mounted -> unmounted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountPhase {
    None,
    Connected,
    Authorized,
    Resolving,
    Mounted,
    Unmounted,
}

pub struct MountRequest<'a> {
    pub volume: &'a str,
    pub dirpath: &'a str,
    pub host: &'a str,
    pub addr: Option<IpAddr>,
}

#[derive(Debug)]
pub struct MountReply {
    pub handle: FileHandle,
    pub auth_flavors: Vec<crate::mount::mnt::AuthFlavor>,
}

fn vfs_err_to_wire(e: VfsError) -> WireError {
    match e {
        VfsError::NotFound => WireError::NoEnt,
        VfsError::NotDir => WireError::NotDir,
        VfsError::Stale => WireError::Stale,
        VfsError::Io(_) => WireError::ServerFault,
    }
}

/// Steps 1-7 of spec §4.G. `volume_up` and transport-level allow/deny are
/// performed by the caller before this is invoked (steps 2-3 are external
/// collaborator checks); this function covers export lookup, path
/// authorization, and the resolver walk (steps 1, 4-7).
pub async fn resolve_mount(
    state: &MountState,
    rmtab: &Rmtab,
    vfs: &dyn Vfs,
    resolver: &dyn ReverseResolver,
    req: MountRequest<'_>,
) -> Result<MountReply, WireError> {
    let exports = state.exports();
    let netgroups = state.netgroups();

    let dirpath = req.dirpath.trim_end_matches('/');
    let dir = exports
        .lookup_dir(dirpath)
        .or_else(|| exports.lookup_dir(&format!("/{}", req.volume)))
        .ok_or(WireError::NoEnt)?;

    let outcome = mount_auth::authorize_path(
        &exports,
        &netgroups,
        state.hostspecs(),
        resolver,
        req.host,
        req.addr,
        dirpath,
        false,
    );
    let (item, authorized_path) = match outcome {
        AuthOutcome::Ok { item, authorized_path } => (item, authorized_path),
        AuthOutcome::ReadOnly { item, authorized_path } => (item, authorized_path),
        AuthOutcome::Denied => return Err(WireError::Acces),
    };

    let root = vfs.root(req.volume).await.map_err(vfs_err_to_wire)?;
    let export_uuid = exports.uuid_for(&dir.dir_name);
    let mount_uuid = hash::path_uuid(&authorized_path);

    let volume_root = format!("/{}", req.volume);
    let remainder = dirpath.strip_prefix(&volume_root).unwrap_or("").trim_start_matches('/');
    let inode = if remainder.is_empty() {
        root
    } else {
        walk_path(vfs, root, &volume_root, remainder)
            .await
            .map_err(vfs_err_to_wire)?
    };

    let handle = FileHandle {
        export_uuid,
        mount_uuid,
        inode: inode.0,
    };

    let entry = MountEntry {
        export_name: req.dirpath.to_string(),
        hostname: req.host.to_string(),
        full_path: if dirpath != req.dirpath {
            Some(dirpath.to_string())
        } else {
            None
        },
    };
    state
        .add_mount(rmtab, entry)
        .await
        .map_err(|_| WireError::ServerFault)?;

    debug!(path = dirpath, host = req.host, "mount resolved");

    Ok(MountReply {
        handle,
        auth_flavors: auth_flavors_for(&item),
    })
}

/// Derives the reply's acceptable auth flavors from the export's `sec=`
/// option (spec §4.G step 7, §6): the selectable domain is restricted to
/// `{AUTH_NONE, AUTH_SYS, AUTH_UNIX}`; an unrecognized `sec=` value is logged
/// and falls back to AUTH_UNIX rather than widening the reply's domain.
fn auth_flavors_for(item: &crate::exports::ExportItem) -> Vec<crate::mount::mnt::AuthFlavor> {
    use crate::mount::mnt::AuthFlavor;
    match item.options.sec_type.as_deref() {
        None | Some("sys") | Some("unix") => vec![AuthFlavor::Unix],
        Some("none") => vec![AuthFlavor::None],
        Some(other) => {
            warn!(sec = other, "export sec= value outside {{none,sys,unix}}, defaulting to AUTH_UNIX");
            vec![AuthFlavor::Unix]
        }
    }
}

enum Step {
    Inode(Inode),
    Symlink(String),
}

async fn resolve_one(vfs: &dyn Vfs, parent: &Inode, name: &str) -> Result<Step, VfsError> {
    match vfs.lookup(parent, name).await {
        Ok(result) if result.is_symlink => {
            let target = vfs.read_link(&result.inode).await?;
            Ok(Step::Symlink(target))
        }
        Ok(result) => Ok(Step::Inode(result.inode)),
        Err(VfsError::Stale) => {
            // Stale-inode retry once (spec §4.G step 6).
            match vfs.lookup(parent, name).await {
                Ok(result) if result.is_symlink => {
                    let target = vfs.read_link(&result.inode).await?;
                    Ok(Step::Symlink(target))
                }
                Ok(result) => Ok(Step::Inode(result.inode)),
                Err(e) => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

/// Walks `remainder` (slash-separated, relative to `root_path`) one
/// component at a time, following symlinks. An absolute symlink target must
/// stay under `root_path`; one that escapes is rejected.
async fn walk_path(vfs: &dyn Vfs, root: Inode, root_path: &str, remainder: &str) -> Result<Inode, VfsError> {
    let mut current = root.clone();
    let mut pending: VecDeque<String> = remainder
        .split('/')
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect();

    while let Some(name) = pending.pop_front() {
        match resolve_one(vfs, &current, &name).await? {
            Step::Inode(inode) => current = inode,
            Step::Symlink(target) => {
                if let Some(stripped) = target.strip_prefix('/') {
                    let stripped_root = root_path.trim_start_matches('/');
                    let Some(under_root) = stripped.strip_prefix(stripped_root) else {
                        warn!(target, root_path, "symlink escapes volume root, denying");
                        return Err(VfsError::NotFound);
                    };
                    let mut new_pending: VecDeque<String> = under_root
                        .trim_start_matches('/')
                        .split('/')
                        .filter(|c| !c.is_empty())
                        .map(String::from)
                        .collect();
                    new_pending.extend(pending);
                    pending = new_pending;
                    current = root.clone();
                } else {
                    let mut new_pending: VecDeque<String> =
                        target.split('/').filter(|c| !c.is_empty()).map(String::from).collect();
                    new_pending.extend(pending);
                    pending = new_pending;
                }
            }
        }
    }
    Ok(current)
}

/// Background revalidation task (spec §4.G "Periodic revalidation"):
/// sleeps for `interval`, compares mtimes, and on change re-parses, swaps
/// pointers, purges the auth cache, and re-authorizes every live mount,
/// evicting any that no longer pass.
pub async fn run_revalidation(
    state: Arc<MountState>,
    rmtab: Arc<Rmtab>,
    resolver: Arc<dyn ReverseResolver>,
    exports_path: PathBuf,
    netgroups_path: PathBuf,
    known_volumes: Option<Vec<String>>,
    interval: Duration,
) {
    let mut last_exports_mtime = file_mtime(&exports_path);
    let mut last_netgroups_mtime = file_mtime(&netgroups_path);

    loop {
        tokio::time::sleep(interval).await;
        if state.should_stop() {
            break;
        }

        let exports_mtime = file_mtime(&exports_path);
        let netgroups_mtime = file_mtime(&netgroups_path);
        if exports_mtime == last_exports_mtime && netgroups_mtime == last_netgroups_mtime {
            continue;
        }
        last_exports_mtime = exports_mtime;
        last_netgroups_mtime = netgroups_mtime;

        let volumes: Option<Vec<&str>> = known_volumes.as_ref().map(|v| v.iter().map(String::as_str).collect());
        let (new_exports, new_netgroups) = match reparse(&exports_path, &netgroups_path, volumes.as_deref()) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "revalidation parse failed, keeping previous snapshot");
                continue;
            }
        };

        state.swap_files(new_exports, new_netgroups);
        state.auth_cache().purge();

        let exports = state.exports();
        let netgroups = state.netgroups();
        for entry in state.snapshot().await {
            let path = entry.full_path.as_deref().unwrap_or(&entry.export_name);
            let outcome = mount_auth::authorize_path(
                &exports,
                &netgroups,
                state.hostspecs(),
                resolver.as_ref(),
                &entry.hostname,
                None,
                path,
                false,
            );
            if matches!(outcome, AuthOutcome::Denied) {
                let _ = state.remove_mount(&rmtab, &entry.export_name, &entry.hostname).await;
                debug!(host = entry.hostname, export = entry.export_name, "revoked mount on revalidation");
            }
        }
    }
}

fn file_mtime(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
}

fn reparse(
    exports_path: &std::path::Path,
    netgroups_path: &std::path::Path,
    known_volumes: Option<&[&str]>,
) -> std::io::Result<(ExportsFile, NetgroupsFile)> {
    let exports_contents = std::fs::read_to_string(exports_path)?;
    let netgroups_contents = std::fs::read_to_string(netgroups_path).unwrap_or_default();
    let exports = ExportsFile::parse(&exports_path.to_string_lossy(), &exports_contents, known_volumes);
    let netgroups = NetgroupsFile::parse(&netgroups_path.to_string_lossy(), &netgroups_contents);
    Ok((exports, netgroups))
}
