//! Exports Model (spec §4.C): directory -> {netgroup set, host set, host
//! CIDR set}, plus per-entry options.

use std::collections::HashMap;
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use tracing::warn;

use crate::hash::{self, Uuid};
use crate::parser::{LineMatcher, OPTION_TOKEN_PATTERN};

pub const DIR_MAX_LEN: usize = 1024;
pub const FQDN_MAX_LEN: usize = 256;
pub const NETGROUP_MAX_LEN: usize = 128;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportOptions {
    pub rw: bool,
    pub nosuid: bool,
    pub root: bool,
    pub anon_uid: Option<String>,
    pub sec_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportItem {
    pub name: String,
    pub options: ExportOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDir {
    pub dir_name: String,
    pub netgroups: HashMap<String, ExportItem>,
    pub hosts: HashMap<String, ExportItem>,
}

impl ExportDir {
    fn new(dir_name: String) -> Self {
        ExportDir {
            dir_name,
            netgroups: HashMap::new(),
            hosts: HashMap::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ExportsFile {
    pub filename: String,
    dirs: HashMap<String, ExportDir>,
    by_uuid: HashMap<Uuid, String>,
}

impl ExportsFile {
    /// Parses an exports file. `known_volumes`, when present, restricts
    /// accepted directories to those whose first path component names a
    /// known volume (spec §4.C "Cross-check with volume set").
    pub fn parse(filename: &str, contents: &str, known_volumes: Option<&[&str]>) -> Self {
        let mut file = ExportsFile {
            filename: filename.to_string(),
            dirs: HashMap::new(),
            by_uuid: HashMap::new(),
        };
        let option_tokens = LineMatcher::compile(OPTION_TOKEN_PATTERN)
            .expect("OPTION_TOKEN_PATTERN is a fixed, valid pattern");
        for line in contents.lines() {
            file.parse_line(line, known_volumes, &option_tokens);
        }
        file
    }

    fn parse_line(&mut self, line: &str, known_volumes: Option<&[&str]>, option_tokens: &LineMatcher) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return;
        }

        let mut tokens = line.split_whitespace();
        let raw_dir = match tokens.next() {
            Some(t) => t,
            None => return,
        };
        let dir_name = raw_dir.trim_end_matches('/');
        if dir_name.len() > DIR_MAX_LEN {
            warn!(dir = dir_name, "export directory exceeds max length, rejecting line");
            return;
        }
        if !dir_name.starts_with('/') {
            warn!(dir = dir_name, "export directory missing leading slash, rejecting line");
            return;
        }

        if let Some(volumes) = known_volumes {
            let first_component = dir_name.trim_start_matches('/').split('/').next().unwrap_or("");
            if !volumes.contains(&first_component) {
                warn!(dir = dir_name, "export directory not under a known volume, dropping line");
                return;
            }
        }

        let mut dir = ExportDir::new(dir_name.to_string());
        let mut tokens = tokens.peekable();
        while let Some(tok) = tokens.next() {
            if tok.contains('(') && !tok.ends_with(')') {
                warn!(tok, "unbalanced parenthesis in host token (space inside parens?), skipping");
                while let Some(next) = tokens.peek() {
                    let closed = next.ends_with(')');
                    tokens.next();
                    if closed {
                        break;
                    }
                }
                continue;
            }
            if let Some(name) = tok.strip_prefix('@') {
                let (name, opts_str) = split_token(name);
                if name.is_empty() || name.len() > NETGROUP_MAX_LEN {
                    warn!(tok, "invalid netgroup token, skipping");
                    continue;
                }
                let options = parse_options(opts_str, option_tokens);
                dir.netgroups.insert(
                    name.to_string(),
                    ExportItem {
                        name: name.to_string(),
                        options,
                    },
                );
            } else {
                let (name, opts_str) = split_token(tok);
                if name.is_empty() || name.len() > FQDN_MAX_LEN {
                    warn!(tok, "invalid host token, skipping");
                    continue;
                }
                let options = parse_options(opts_str, option_tokens);
                dir.hosts.insert(
                    name.to_string(),
                    ExportItem {
                        name: name.to_string(),
                        options,
                    },
                );
            }
        }

        self.insert(dir);
    }

    /// Inserts a directory, keying it by name and (unless its hash collides
    /// with the reserved marker) by export-uuid.
    pub fn insert(&mut self, dir: ExportDir) {
        let uuid = hash::path_uuid(&dir.dir_name);
        if !hash::is_collision_marker(&uuid) {
            self.by_uuid.insert(uuid, dir.dir_name.clone());
        }
        self.dirs.insert(dir.dir_name.clone(), dir);
    }

    pub fn remove(&mut self, dir_name: &str) -> Option<ExportDir> {
        let removed = self.dirs.remove(dir_name)?;
        let uuid = hash::path_uuid(dir_name);
        self.by_uuid.remove(&uuid);
        Some(removed)
    }

    pub fn lookup_dir(&self, path: &str) -> Option<&ExportDir> {
        let path = path.trim_end_matches('/');
        let owned;
        let key = if path.starts_with('/') {
            path
        } else {
            owned = format!("/{path}");
            &owned
        };
        self.dirs.get(key)
    }

    pub fn lookup_by_uuid(&self, uuid: &Uuid) -> Option<&ExportDir> {
        if hash::is_collision_marker(uuid) {
            return None;
        }
        let name = self.by_uuid.get(uuid)?;
        self.dirs.get(name)
    }

    pub fn uuid_for(&self, dir_name: &str) -> Uuid {
        hash::path_uuid(dir_name)
    }

    pub fn dirs(&self) -> impl Iterator<Item = &ExportDir> {
        self.dirs.values()
    }

    /// Renders the model back into exports-file syntax. Round-trips through
    /// `parse` modulo token ordering and whitespace.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for dir in self.dirs.values() {
            out.push_str(&dir.dir_name);
            for (name, item) in &dir.hosts {
                out.push(' ');
                out.push_str(name);
                out.push_str(&format_options(&item.options));
            }
            for (name, item) in &dir.netgroups {
                out.push(' ');
                out.push('@');
                out.push_str(name);
                out.push_str(&format_options(&item.options));
            }
            out.push('\n');
        }
        out
    }
}

fn format_options(o: &ExportOptions) -> String {
    let mut toks = Vec::new();
    if o.rw {
        toks.push("rw".to_string());
    }
    if o.nosuid {
        toks.push("nosuid".to_string());
    }
    if o.root {
        toks.push("root".to_string());
    }
    if let Some(uid) = &o.anon_uid {
        toks.push(format!("anonuid={uid}"));
    }
    if let Some(sec) = &o.sec_type {
        toks.push(format!("sec={sec}"));
    }
    if toks.is_empty() {
        String::new()
    } else {
        format!("({})", toks.join(","))
    }
}

/// Splits `name(opts)` into `(name, Some("opts"))`, or `(name, None)` when
/// there is no parenthesized suffix.
fn split_token(tok: &str) -> (&str, Option<&str>) {
    match tok.find('(') {
        Some(open) if tok.ends_with(')') => (&tok[..open], Some(&tok[open + 1..tok.len() - 1])),
        _ => (tok, None),
    }
}

fn parse_options(opts: Option<&str>, option_tokens: &LineMatcher) -> ExportOptions {
    let mut options = ExportOptions::default();
    let Some(opts) = opts else {
        return options;
    };
    for tok in option_tokens.tokens(opts) {
        match tok.as_str() {
            "rw" => options.rw = true,
            "ro" => options.rw = false,
            "nosuid" => options.nosuid = true,
            "root" => options.root = true,
            other => {
                if let Some(value) = other.strip_prefix("anonuid=") {
                    options.anon_uid = Some(value.to_string());
                } else if let Some(value) = other.strip_prefix("sec=") {
                    options.sec_type = Some(value.to_string());
                } else {
                    warn!(option = other, "unknown export option token, ignoring");
                }
            }
        }
    }
    options
}

/// Matches `host` (exact, then CIDR, then `*`) against an export
/// directory's host map. IPv4-only: a CIDR key never matches an IPv6
/// address, and an IPv6 address never errors, it simply fails to match.
pub fn match_host<'a>(dir: &'a ExportDir, host: &str, addr: Option<IpAddr>) -> Option<&'a ExportItem> {
    if let Some(item) = dir.hosts.get(host) {
        return Some(item);
    }
    if let Some(IpAddr::V4(v4addr)) = addr {
        let mut best: Option<(u8, &ExportItem)> = None;
        for (key, item) in &dir.hosts {
            if !key.contains('/') {
                continue;
            }
            if let Ok(IpNetwork::V4(net)) = key.parse::<IpNetwork>() {
                if net.contains(v4addr) && best.map_or(true, |(prefix, _)| net.prefix() > prefix) {
                    best = Some((net.prefix(), item));
                }
            }
        }
        if let Some((_, item)) = best {
            return Some(item);
        }
    }
    dir.hosts.get("*")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_path_matches_lookup_by_uuid() {
        let file = ExportsFile::parse("exports", "/vol0 client1(rw)\n", None);
        let by_path = file.lookup_dir("/vol0").unwrap();
        let uuid = file.uuid_for("vol0");
        let by_uuid = file.lookup_by_uuid(&uuid).unwrap();
        assert_eq!(by_path.dir_name, by_uuid.dir_name);
    }

    #[test]
    fn rw_ro_last_one_wins() {
        let file = ExportsFile::parse("exports", "/vol0 h1(ro,rw)\n", None);
        let dir = file.lookup_dir("/vol0").unwrap();
        assert!(dir.hosts.get("h1").unwrap().options.rw);
        let file = ExportsFile::parse("exports", "/vol0 h1(rw,ro)\n", None);
        let dir = file.lookup_dir("/vol0").unwrap();
        assert!(!dir.hosts.get("h1").unwrap().options.rw);
    }

    #[test]
    fn unknown_volume_line_is_dropped() {
        let file = ExportsFile::parse("exports", "/other h1(rw)\n", Some(&["vol0"]));
        assert!(file.lookup_dir("/other").is_none());
    }

    #[test]
    fn cidr_match_at_32_is_exact_and_0_matches_everything() {
        let file = ExportsFile::parse("exports", "/vol0 10.0.0.5/32(rw) 0.0.0.0/0(ro)\n", None);
        let dir = file.lookup_dir("/vol0").unwrap();
        let hit = match_host(dir, "nohost", Some("10.0.0.5".parse().unwrap()));
        assert!(hit.unwrap().options.rw);
        let hit = match_host(dir, "nohost", Some("10.0.0.6".parse().unwrap()));
        assert!(!hit.unwrap().options.rw);
    }

    #[test]
    fn ipv6_address_never_matches_cidr() {
        let file = ExportsFile::parse("exports", "/vol0 0.0.0.0/0(rw)\n", None);
        let dir = file.lookup_dir("/vol0").unwrap();
        let addr: IpAddr = "::1".parse().unwrap();
        assert!(match_host(dir, "nohost", Some(addr)).is_none());
    }

    #[test]
    fn collision_marker_uuid_never_resolves() {
        let file = ExportsFile::parse("exports", "/vol0 h1(rw)\n", None);
        let mut marker = [0u8; 16];
        marker[12..16].copy_from_slice(&1u32.to_be_bytes());
        assert!(file.lookup_by_uuid(&marker).is_none());
    }

    #[test]
    fn parse_serialize_parse_round_trips() {
        let src = "/vol0 h1(rw,nosuid,anonuid=99) @group1(ro,sec=krb5)\n/vol1 h2(root)\n";
        let file = ExportsFile::parse("exports", src, None);
        let reparsed = ExportsFile::parse("exports", &file.serialize(), None);
        assert_eq!(file.dirs, reparsed.dirs);
    }

    #[test]
    fn directory_line_at_max_length_accepted_one_over_rejected() {
        let at_limit = format!("/{}", "a".repeat(DIR_MAX_LEN - 1));
        assert_eq!(at_limit.len(), DIR_MAX_LEN);
        let file = ExportsFile::parse("exports", &format!("{at_limit} h1(rw)\n"), None);
        assert!(file.lookup_dir(&at_limit).is_some());

        let over_limit = format!("/{}", "a".repeat(DIR_MAX_LEN));
        assert_eq!(over_limit.len(), DIR_MAX_LEN + 1);
        let file = ExportsFile::parse("exports", &format!("{over_limit} h1(rw)\n"), None);
        assert!(file.lookup_dir(&over_limit).is_none());
    }

    #[test]
    fn host_token_with_space_inside_parens_is_dropped_rest_of_line_continues() {
        let file = ExportsFile::parse("exports", "/vol0 bad(rw, nosuid) h1(rw)\n", None);
        let dir = file.lookup_dir("/vol0").unwrap();
        assert!(!dir.hosts.contains_key("bad"));
        assert!(!dir.hosts.contains_key("nosuid)"));
        assert!(dir.hosts.get("h1").unwrap().options.rw);
    }
}
