//! Mount-State Authorizer (spec §4.E): answers "may host H mount path P?",
//! "may host H read fh F?", "may host H write fh F?".

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use ipnetwork::IpNetwork;
use tracing::{debug, warn};

use crate::auth_cache::AuthCache;
use crate::config::VolumeConfig;
use crate::exports::{self, ExportItem, ExportsFile};
use crate::hash::Uuid;
use crate::netgroups::NetgroupsFile;

/// Carries an export-uuid, a mount-uuid derived from the *authorized* path,
/// and the target inode identity (opaque to this module).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub export_uuid: Uuid,
    pub mount_uuid: Uuid,
    pub inode: Vec<u8>,
}

/// Resolves a caller's address back to a hostname. Injected so unit tests
/// can supply deterministic results without a real resolver; production
/// code plugs in `dns-lookup`'s reverse lookup.
pub trait ReverseResolver: Send + Sync {
    fn reverse_lookup(&self, addr: IpAddr) -> Option<String>;
}

pub struct DnsReverseResolver;

impl ReverseResolver for DnsReverseResolver {
    fn reverse_lookup(&self, addr: IpAddr) -> Option<String> {
        dns_lookup::lookup_addr(&addr).ok()
    }
}

/// `nfs3.<vol>.export-dir` hostspec table (spec §4.E, §6): paths that carry
/// an additional `(host|cidr|...)` restriction on subdirectory mounts, keyed
/// by the normalized abspath.
#[derive(Debug, Clone, Default)]
pub struct HostSpecTable {
    by_path: HashMap<String, Vec<String>>,
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

impl HostSpecTable {
    pub fn from_volumes(volumes: &[VolumeConfig]) -> Self {
        let mut by_path = HashMap::new();
        for volume in volumes {
            for spec in volume.export_dir_specs() {
                if !spec.hostspec.is_empty() {
                    by_path.insert(normalize_path(&spec.path), spec.hostspec);
                }
            }
        }
        HostSpecTable { by_path }
    }

    pub fn lookup(&self, path: &str) -> Option<&[String]> {
        self.by_path.get(&normalize_path(path)).map(|v| v.as_slice())
    }
}

/// Does `host`/`addr` satisfy one of `hostspec`'s entries? Each entry is an
/// exact hostname, `*`, or an IPv4 CIDR/bare address.
fn hostspec_allows(hostspec: &[String], host: &str, addr: Option<IpAddr>) -> bool {
    for entry in hostspec {
        if entry == "*" || entry == host {
            return true;
        }
        if let Some(IpAddr::V4(v4addr)) = addr {
            if let Ok(net) = entry.parse::<IpNetwork>() {
                if let IpNetwork::V4(net) = net {
                    if net.contains(v4addr) {
                        return true;
                    }
                }
            } else if let Ok(IpAddr::V4(exact)) = entry.parse::<IpAddr>() {
                if exact == v4addr {
                    return true;
                }
            }
        }
    }
    false
}

#[derive(Debug, Clone)]
pub enum AuthOutcome {
    Ok { item: Arc<ExportItem>, authorized_path: String },
    ReadOnly { item: Arc<ExportItem>, authorized_path: String },
    Denied,
}

fn host_authorized(
    dir: &exports::ExportDir,
    netgroups: &NetgroupsFile,
    host: &str,
    addr: Option<IpAddr>,
) -> Option<Arc<ExportItem>> {
    if let Some(item) = exports::match_host(dir, host, addr) {
        return Some(Arc::new(item.clone()));
    }
    for (ng_name, item) in &dir.netgroups {
        if netgroups.is_host_member(ng_name, host) {
            return Some(Arc::new(item.clone()));
        }
    }
    None
}

fn degrade(item: Arc<ExportItem>, authorized_path: String, is_write: bool) -> AuthOutcome {
    if is_write && !item.options.rw {
        AuthOutcome::ReadOnly { item, authorized_path }
    } else {
        AuthOutcome::Ok { item, authorized_path }
    }
}

/// Parent of `path`, or `None` once there is no further directory to
/// escalate to (a top-level export has no parent).
fn parent_path(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = path.trim_start_matches('/').split('/').filter(|s| !s.is_empty()).collect();
    parts.pop();
    if parts.is_empty() {
        None
    } else {
        Some(format!("/{}", parts.join("/")))
    }
}

/// Path-form algorithm (spec §4.E): looks up `path` directly, falling back
/// to reverse-DNS, and escalating to the parent directory on denial.
#[allow(clippy::too_many_arguments)]
pub fn authorize_path(
    exports: &ExportsFile,
    netgroups: &NetgroupsFile,
    hostspecs: &HostSpecTable,
    resolver: &dyn ReverseResolver,
    host: &str,
    addr: Option<IpAddr>,
    path: &str,
    is_write: bool,
) -> AuthOutcome {
    if let Some(hostspec) = hostspecs.lookup(path) {
        if !hostspec_allows(hostspec, host, addr) {
            warn!(path, host, "denied by export-dir hostspec restriction");
            return AuthOutcome::Denied;
        }
    }

    let mut current = path.trim_end_matches('/').to_string();
    if current.is_empty() {
        current = "/".to_string();
    }

    loop {
        if let Some(dir) = exports.lookup_dir(&current) {
            let mut found = host_authorized(dir, netgroups, host, addr);
            if found.is_none() {
                if let Some(addr) = addr {
                    if let Some(fqdn) = resolver.reverse_lookup(addr) {
                        found = host_authorized(dir, netgroups, &fqdn, None);
                    }
                }
            }
            if let Some(item) = found {
                debug!(path = %current, host, "authorized");
                return degrade(item, current, is_write);
            }
        }
        match parent_path(&current) {
            Some(parent) => current = parent,
            None => {
                warn!(path, host, "authorization denied, no further parent to escalate to");
                return AuthOutcome::Denied;
            }
        }
    }
}

/// Fh-form algorithm (spec §4.E): looks up the export by `fh.export_uuid`
/// directly, no parent escalation, since the mount-uuid already pins the
/// authorized directory for this mount. Consults and populates the auth
/// cache keyed by `(export_uuid, mount_uuid, host)`.
#[allow(clippy::too_many_arguments)]
pub fn authorize_handle(
    exports: &ExportsFile,
    netgroups: &NetgroupsFile,
    cache: &AuthCache,
    resolver: &dyn ReverseResolver,
    host: &str,
    addr: Option<IpAddr>,
    fh: &FileHandle,
    is_write: bool,
) -> AuthOutcome {
    if let Some(entry) = cache.lookup(&fh.export_uuid, &fh.mount_uuid, host) {
        return degrade(entry.item, String::new(), is_write);
    }

    let Some(dir) = exports.lookup_by_uuid(&fh.export_uuid) else {
        return AuthOutcome::Denied;
    };

    let mut found = host_authorized(dir, netgroups, host, addr);
    if found.is_none() {
        if let Some(addr) = addr {
            if let Some(fqdn) = resolver.reverse_lookup(addr) {
                found = host_authorized(dir, netgroups, &fqdn, None);
            }
        }
    }

    match found {
        Some(item) => {
            cache.insert(&fh.export_uuid, &fh.mount_uuid, host, item.clone());
            degrade(item, dir.dir_name.clone(), is_write)
        }
        None => AuthOutcome::Denied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exports::ExportsFile;
    use crate::netgroups::NetgroupsFile;
    use std::time::Duration;

    struct NoResolver;
    impl ReverseResolver for NoResolver {
        fn reverse_lookup(&self, _addr: IpAddr) -> Option<String> {
            None
        }
    }

    struct FixedResolver(&'static str);
    impl ReverseResolver for FixedResolver {
        fn reverse_lookup(&self, _addr: IpAddr) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    #[test]
    fn s1_whole_volume_mount_by_host_literal() {
        let exports = ExportsFile::parse("exports", "/vol0 client1(rw,sec=sys)\n", None);
        let netgroups = NetgroupsFile::parse("netgroups", "");
        let outcome = authorize_path(&exports, &netgroups, &HostSpecTable::default(), &NoResolver, "client1", None, "/vol0", false);
        assert!(matches!(outcome, AuthOutcome::Ok { .. }));
    }

    #[test]
    fn s2_subdirectory_mount_escalates_to_parent() {
        let exports = ExportsFile::parse("exports", "/vol0 hostA(rw)\n", None);
        let netgroups = NetgroupsFile::parse("netgroups", "");
        let outcome = authorize_path(&exports, &netgroups, &HostSpecTable::default(), &NoResolver, "hostA", None, "/vol0/sub", false);
        match outcome {
            AuthOutcome::Ok { authorized_path, .. } => assert_eq!(authorized_path, "/vol0"),
            other => panic!("expected Ok, got {other:?}"),
        }
    }

    #[test]
    fn s3_netgroup_expansion_two_levels() {
        let exports = ExportsFile::parse("exports", "/vol0 @group1(rw)\n", None);
        let netgroups = NetgroupsFile::parse("netgroups", "group1 (h1,,) @group2\ngroup2 (h2,,)\n");
        let outcome = authorize_path(&exports, &netgroups, &HostSpecTable::default(), &NoResolver, "h2", None, "/vol0", false);
        assert!(matches!(outcome, AuthOutcome::Ok { .. }));
    }

    #[test]
    fn s4_cidr_match_before_reverse_dns_fallback() {
        let exports = ExportsFile::parse(
            "exports",
            "/vol0 10.0.0.0/24(rw) special.example.com(ro)\n",
            None,
        );
        let netgroups = NetgroupsFile::parse("netgroups", "");
        let addr: IpAddr = "10.0.0.5".parse().unwrap();
        let resolver = FixedResolver("special.example.com");
        let outcome = authorize_path(&exports, &netgroups, &HostSpecTable::default(), &resolver, "unrelated-name", Some(addr), "/vol0", false);
        match outcome {
            AuthOutcome::Ok { item, .. } => assert!(item.options.rw),
            other => panic!("expected Ok(rw), got {other:?}"),
        }
    }

    #[test]
    fn s5_read_only_export_degrades_write_op() {
        let exports = ExportsFile::parse("exports", "/vol0 h1(ro)\n", None);
        let netgroups = NetgroupsFile::parse("netgroups", "");
        let mnt = authorize_path(&exports, &netgroups, &HostSpecTable::default(), &NoResolver, "h1", None, "/vol0", false);
        assert!(matches!(mnt, AuthOutcome::Ok { .. }));
        let op = authorize_path(&exports, &netgroups, &HostSpecTable::default(), &NoResolver, "h1", None, "/vol0", true);
        assert!(matches!(op, AuthOutcome::ReadOnly { .. }));
    }

    #[test]
    fn fh_form_skips_escalation_and_uses_cache() {
        let exports = ExportsFile::parse("exports", "/vol0 h1(rw)\n", None);
        let netgroups = NetgroupsFile::parse("netgroups", "");
        let cache = AuthCache::new(Duration::from_secs(60));
        let fh = FileHandle {
            export_uuid: exports.uuid_for("/vol0"),
            mount_uuid: exports.uuid_for("/vol0"),
            inode: vec![0],
        };
        let first = authorize_handle(&exports, &netgroups, &cache, &NoResolver, "h1", None, &fh, false);
        assert!(matches!(first, AuthOutcome::Ok { .. }));
        assert!(cache.lookup(&fh.export_uuid, &fh.mount_uuid, "h1").is_some());
        let second = authorize_handle(&exports, &netgroups, &cache, &NoResolver, "h1", None, &fh, false);
        assert!(matches!(second, AuthOutcome::Ok { .. }));
    }

    #[test]
    fn fh_form_denies_unknown_export_uuid() {
        let exports = ExportsFile::parse("exports", "/vol0 h1(rw)\n", None);
        let netgroups = NetgroupsFile::parse("netgroups", "");
        let cache = AuthCache::new(Duration::from_secs(60));
        let fh = FileHandle {
            export_uuid: [9u8; 16],
            mount_uuid: [9u8; 16],
            inode: vec![0],
        };
        let outcome = authorize_handle(&exports, &netgroups, &cache, &NoResolver, "h1", None, &fh, false);
        assert!(matches!(outcome, AuthOutcome::Denied));
    }

    #[test]
    fn authorizer_is_monotone_in_options() {
        let netgroups = NetgroupsFile::parse("netgroups", "");
        let exports = ExportsFile::parse("exports", "/vol0 h1(sec=krb5)\n", None);
        let base = authorize_path(&exports, &netgroups, &HostSpecTable::default(), &NoResolver, "h1", None, "/vol0", false);
        assert!(matches!(base, AuthOutcome::Ok { .. }));

        let exports = ExportsFile::parse("exports", "/vol0 h1(rw,nosuid,root,sec=krb5)\n", None);
        let more_permissive = authorize_path(&exports, &netgroups, &HostSpecTable::default(), &NoResolver, "h1", None, "/vol0", false);
        assert!(matches!(more_permissive, AuthOutcome::Ok { .. }));
    }

    #[test]
    fn hostspec_denies_subdir_mount_from_unmatched_host_regardless_of_exports() {
        let exports = ExportsFile::parse("exports", "/vol0 hostA(rw)\n", None);
        let netgroups = NetgroupsFile::parse("netgroups", "");
        let volumes = vec![VolumeConfig {
            volume_id: "vol0".to_string(),
            export_dir: vec!["/vol0/sub(hostB)".to_string()],
        }];
        let hostspecs = HostSpecTable::from_volumes(&volumes);
        // hostA is allowed by the general exports file but not by the export-dir hostspec.
        let outcome = authorize_path(&exports, &netgroups, &hostspecs, &NoResolver, "hostA", None, "/vol0/sub", false);
        assert!(matches!(outcome, AuthOutcome::Denied));
    }

    #[test]
    fn hostspec_allows_matching_host_to_mount_subdir() {
        let exports = ExportsFile::parse("exports", "/vol0 hostB(rw)\n", None);
        let netgroups = NetgroupsFile::parse("netgroups", "");
        let volumes = vec![VolumeConfig {
            volume_id: "vol0".to_string(),
            export_dir: vec!["/vol0/sub(hostB)".to_string()],
        }];
        let hostspecs = HostSpecTable::from_volumes(&volumes);
        let outcome = authorize_path(&exports, &netgroups, &hostspecs, &NoResolver, "hostB", None, "/vol0/sub", false);
        assert!(matches!(outcome, AuthOutcome::Ok { .. }));
    }

    #[test]
    fn hostspec_denies_via_cidr_mismatch() {
        let exports = ExportsFile::parse("exports", "/vol0 10.0.0.0/8(rw)\n", None);
        let netgroups = NetgroupsFile::parse("netgroups", "");
        let volumes = vec![VolumeConfig {
            volume_id: "vol0".to_string(),
            export_dir: vec!["/vol0/sub(192.168.1.0/24)".to_string()],
        }];
        let hostspecs = HostSpecTable::from_volumes(&volumes);
        let addr: IpAddr = "10.0.0.5".parse().unwrap();
        let outcome = authorize_path(&exports, &netgroups, &hostspecs, &NoResolver, "nohost", Some(addr), "/vol0/sub", false);
        assert!(matches!(outcome, AuthOutcome::Denied));
    }

    #[test]
    fn path_without_hostspec_entry_is_unrestricted() {
        let exports = ExportsFile::parse("exports", "/vol0 hostA(rw)\n", None);
        let netgroups = NetgroupsFile::parse("netgroups", "");
        let volumes = vec![VolumeConfig {
            volume_id: "vol0".to_string(),
            export_dir: vec!["/vol0/other(hostB)".to_string()],
        }];
        let hostspecs = HostSpecTable::from_volumes(&volumes);
        let outcome = authorize_path(&exports, &netgroups, &hostspecs, &NoResolver, "hostA", None, "/vol0/sub", false);
        assert!(matches!(outcome, AuthOutcome::Ok { .. }));
    }
}
