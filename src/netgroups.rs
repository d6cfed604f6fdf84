//! Netgroups Model (spec §4.B): an in-memory graph of netgroup entries,
//! each holding nested netgroups and (host,user,domain) triples.
//!
//! Netgroups share by name, not by copy — a netgroup referenced by two
//! parents is one arena slot, not two. Cycles are legal and terminated by a
//! visited set keyed by arena index during lookup.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{trace, warn};

use crate::parser::{LineMatcher, HOST_TRIPLE_PATTERN};

/// Index into `NetgroupsFile`'s arena. Never an owning pointer, so multiple
/// parents can reference the same entry and cycles cost nothing to permit.
pub type NetgroupIndex = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetgroupHost {
    pub hostname: String,
    pub user: Option<String>,
    pub domain: Option<String>,
}

#[derive(Debug, Default)]
pub struct NetgroupEntry {
    pub name: String,
    pub sub_netgroups: HashMap<String, NetgroupIndex>,
    pub hosts: HashMap<String, NetgroupHost>,
}

#[derive(Debug, Default)]
pub struct NetgroupsFile {
    pub filename: String,
    entries: Vec<NetgroupEntry>,
    index: HashMap<String, NetgroupIndex>,
}

fn is_ignored_line(line: &str) -> bool {
    match line.chars().next() {
        None => true,
        Some(c) => c == '#' || c == ' ' || c == '\t' || c == '\0',
    }
}

impl NetgroupsFile {
    pub fn parse(filename: &str, contents: &str) -> Self {
        let mut file = NetgroupsFile {
            filename: filename.to_string(),
            entries: Vec::new(),
            index: HashMap::new(),
        };
        let host_triple = LineMatcher::compile(HOST_TRIPLE_PATTERN)
            .expect("HOST_TRIPLE_PATTERN is a fixed, valid pattern");
        for line in contents.lines() {
            file.parse_line(line, &host_triple);
        }
        file
    }

    fn ensure_entry(&mut self, name: &str) -> NetgroupIndex {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.entries.len();
        self.entries.push(NetgroupEntry {
            name: name.to_string(),
            ..Default::default()
        });
        self.index.insert(name.to_string(), idx);
        idx
    }

    fn parse_line(&mut self, line: &str, host_triple: &LineMatcher) {
        let line = line.trim_end_matches(['\r', '\n']);
        if is_ignored_line(line) {
            return;
        }

        let mut tokens = line.split_whitespace();
        let parent_name = match tokens.next() {
            Some(t) => t,
            None => return,
        };
        if parent_name.starts_with('@') || parent_name.starts_with('(') {
            warn!(line, "netgroups line does not start with a bare name, skipping");
            return;
        }

        let parent_idx = self.ensure_entry(parent_name);
        let mut saw_token = false;
        for tok in tokens {
            saw_token = true;
            if let Some(name) = tok.strip_prefix('@') {
                if name.is_empty() {
                    warn!(tok, "empty netgroup reference, skipping token");
                    continue;
                }
                let child_idx = self.ensure_entry(name);
                self.entries[parent_idx]
                    .sub_netgroups
                    .insert(name.to_string(), child_idx);
            } else if tok.starts_with('(') {
                match host_triple.captures(tok) {
                    Some(caps) => {
                        let hostname = caps[1].to_string();
                        if hostname.is_empty() {
                            warn!(tok, "host triple with empty hostname, skipping token");
                            continue;
                        }
                        let user = non_empty(&caps[2]);
                        let domain = non_empty(&caps[3]);
                        self.entries[parent_idx].hosts.insert(
                            hostname.clone(),
                            NetgroupHost {
                                hostname,
                                user,
                                domain,
                            },
                        );
                    }
                    None => {
                        warn!(tok, "malformed host triple, skipping token");
                    }
                }
            } else {
                warn!(tok, "unrecognized netgroup line token, skipping");
            }
        }
        if !saw_token {
            trace!(parent = parent_name, "netgroup line with bare name only");
        }
    }

    pub fn find(&self, name: &str) -> Option<&NetgroupEntry> {
        self.index.get(name).map(|&idx| &self.entries[idx])
    }

    /// Breadth-first membership test: does `host` appear anywhere reachable
    /// from `netgroup`, directly or via nested sub-netgroups? Cycle-safe via
    /// a visited set keyed by arena index.
    pub fn is_host_member(&self, netgroup: &str, host: &str) -> bool {
        let Some(&start) = self.index.get(netgroup) else {
            return false;
        };
        let mut visited: HashSet<NetgroupIndex> = HashSet::new();
        let mut queue: VecDeque<NetgroupIndex> = VecDeque::new();
        queue.push_back(start);
        visited.insert(start);

        while let Some(idx) = queue.pop_front() {
            let entry = &self.entries[idx];
            if entry.hosts.contains_key(host) {
                return true;
            }
            for &child in entry.sub_netgroups.values() {
                if visited.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        false
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
