//! Process-wide configuration knobs (spec §6), loaded from a TOML file.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::CoreError;

/// A parsed `nfs3.<vol>.export-dir` entry: an abspath, optionally followed
/// by a `(host|cidr|...)` auth spec that further restricts who may mount
/// that subdirectory (spec §4.E "Hostspec-scoped subdir auth", §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDirSpec {
    pub path: String,
    pub hostspec: Vec<String>,
}

/// Splits `<path>` or `<path>(spec1|spec2|...)` into path and hostspec list.
/// An empty hostspec means the path carries no subdirectory restriction.
pub fn parse_export_dir(raw: &str) -> ExportDirSpec {
    let raw = raw.trim();
    match raw.find('(') {
        Some(open) if raw.ends_with(')') => {
            let path = raw[..open].trim_end_matches('/').to_string();
            let hostspec = raw[open + 1..raw.len() - 1]
                .split('|')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            ExportDirSpec { path, hostspec }
        }
        _ => ExportDirSpec {
            path: raw.trim_end_matches('/').to_string(),
            hostspec: Vec::new(),
        },
    }
}

/// Per-volume section: `[[nfs.volume]]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VolumeConfig {
    pub volume_id: String,
    #[serde(default)]
    pub export_dir: Vec<String>,
}

impl VolumeConfig {
    pub fn export_dir_specs(&self) -> Vec<ExportDirSpec> {
        self.export_dir.iter().map(|raw| parse_export_dir(raw)).collect()
    }
}

/// The `[nfs]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NfsConfig {
    pub exports_auth: bool,
    pub auth_refresh_interval_sec: u64,
    pub auth_cache_ttl_sec: u64,
    pub mount_rmtab: String,
    pub export_volumes: bool,
    pub export_dirs: bool,
    pub volume: Vec<VolumeConfig>,
}

impl Default for NfsConfig {
    fn default() -> Self {
        NfsConfig {
            exports_auth: true,
            auth_refresh_interval_sec: 2,
            auth_cache_ttl_sec: 300,
            mount_rmtab: String::new(),
            export_volumes: true,
            export_dirs: true,
            volume: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub nfs: NfsConfig,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Config, CoreError> {
        toml::from_str(s).map_err(|e| CoreError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Config, CoreError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn auth_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.nfs.auth_refresh_interval_sec)
    }

    pub fn auth_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.nfs.auth_cache_ttl_sec)
    }

    pub fn rmtab_path(&self) -> Option<std::path::PathBuf> {
        if self.nfs.mount_rmtab.is_empty() {
            None
        } else {
            Some(std::path::PathBuf::from(&self.nfs.mount_rmtab))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert!(cfg.nfs.exports_auth);
        assert_eq!(cfg.nfs.auth_refresh_interval_sec, 2);
        assert_eq!(cfg.nfs.auth_cache_ttl_sec, 300);
        assert_eq!(cfg.rmtab_path(), None);
    }

    #[test]
    fn parses_volume_array_of_tables() {
        let toml = r#"
            [nfs]
            exports_auth = true
            auth_refresh_interval_sec = 5
            auth_cache_ttl_sec = 60
            mount_rmtab = "/var/lib/rmtab"
            export_volumes = true
            export_dirs = false

            [[nfs.volume]]
            volume_id = "11111111-1111-1111-1111-111111111111"
            export_dir = ["/vol0", "/vol0/sub"]
        "#;
        let cfg = Config::from_toml_str(toml).unwrap();
        assert_eq!(cfg.nfs.auth_refresh_interval_sec, 5);
        assert_eq!(cfg.nfs.volume.len(), 1);
        assert_eq!(cfg.nfs.volume[0].export_dir.len(), 2);
        assert_eq!(cfg.rmtab_path().unwrap(), Path::new("/var/lib/rmtab"));
    }

    #[test]
    fn export_dir_without_hostspec_has_no_restriction() {
        let spec = parse_export_dir("/vol0/sub");
        assert_eq!(spec.path, "/vol0/sub");
        assert!(spec.hostspec.is_empty());
    }

    #[test]
    fn export_dir_with_hostspec_parses_pipe_separated_list() {
        let spec = parse_export_dir("/vol0/sub(10.0.0.0/24|host1|*.example.com)");
        assert_eq!(spec.path, "/vol0/sub");
        assert_eq!(spec.hostspec, vec!["10.0.0.0/24", "host1", "*.example.com"]);
    }

    #[test]
    fn volume_config_export_dir_specs_mixes_restricted_and_unrestricted() {
        let vc = VolumeConfig {
            export_dir: vec!["/vol0".to_string(), "/vol0/sub(10.0.0.1)".to_string()],
            ..Default::default()
        };
        let specs = vc.export_dir_specs();
        assert_eq!(specs.len(), 2);
        assert!(specs[0].hostspec.is_empty());
        assert_eq!(specs[1].hostspec, vec!["10.0.0.1"]);
    }
}
