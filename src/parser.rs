//! Line Parser (spec §4.A): a regex-bounded tokenizer over a compiled
//! pattern, offering a "bind a string, pull matches one at a time" contract.
//!
//! The three pattern instances used by the upper layers (netgroup
//! reference, host token, option token) are exposed as constructors rather
//! than shared global regexes, matching the original's per-caller
//! `parser_init`.

use regex::Regex;

use crate::error::CoreError;

/// `@name` or `@name(options)` — a netgroup reference token.
pub const NETGROUP_REF_PATTERN: &str = r"@([A-Za-z0-9_.-]+)(\([^)]*\))?";

/// `host(options)` or `cidr(options)` — a host/CIDR token.
pub const HOST_TOKEN_PATTERN: &str = r"([A-Za-z0-9_.:/*-]+)(\([^)]*\))?";

/// A single comma-separated option inside parens.
pub const OPTION_TOKEN_PATTERN: &str = r"[^,\s]+";

/// `(host,user,domain)` — a netgroup host triple.
pub const HOST_TRIPLE_PATTERN: &str = r"^\(([^,()\s]*),([^,()\s]*),([^,()\s]*)\)$";

/// A compiled pattern. `bind` opens a cursor over a string; `next_match` on
/// the cursor advances past each match, returning an owned copy; dropping
/// the cursor is the `unset` step. The `LineMatcher` itself can be bound
/// repeatedly (`deinit` is simply dropping the `LineMatcher`).
pub struct LineMatcher {
    regex: Regex,
}

impl LineMatcher {
    pub fn compile(pattern: &str) -> Result<Self, CoreError> {
        Regex::new(pattern)
            .map(|regex| LineMatcher { regex })
            .map_err(|e| CoreError::Config(format!("bad pattern {pattern:?}: {e}")))
    }

    pub fn bind<'a>(&'a self, text: &'a str) -> LineCursor<'a> {
        LineCursor {
            regex: &self.regex,
            text,
            offset: 0,
        }
    }

    /// Every non-overlapping match in `text`, collected eagerly.
    pub fn tokens(&self, text: &str) -> Vec<String> {
        self.regex.find_iter(text).map(|m| m.as_str().to_string()).collect()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn captures<'a>(&self, text: &'a str) -> Option<regex::Captures<'a>> {
        self.regex.captures(text)
    }
}

/// A cursor bound to one string; `next_match` is `next()`, dropping the
/// cursor is `unset()`.
pub struct LineCursor<'a> {
    regex: &'a Regex,
    text: &'a str,
    offset: usize,
}

impl<'a> LineCursor<'a> {
    pub fn next_match(&mut self) -> Option<String> {
        let rest = self.text.get(self.offset..)?;
        let m = self.regex.find(rest)?;
        let matched = m.as_str().to_string();
        self.offset += m.end().max(1);
        Some(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn netgroup_ref_pattern_extracts_name() {
        let matcher = LineMatcher::compile(NETGROUP_REF_PATTERN).unwrap();
        let caps = matcher.captures("@group1").unwrap();
        assert_eq!(&caps[1], "group1");
    }

    #[test]
    fn host_triple_pattern_rejects_bad_comma_count() {
        let matcher = LineMatcher::compile(HOST_TRIPLE_PATTERN).unwrap();
        assert!(matcher.is_match("(h1,,)"));
        assert!(!matcher.is_match("(h1,u1)"));
    }

    #[test]
    fn cursor_advances_across_multiple_matches() {
        let matcher = LineMatcher::compile(OPTION_TOKEN_PATTERN).unwrap();
        let mut cursor = matcher.bind("rw,nosuid,anonuid=99");
        assert_eq!(cursor.next_match().as_deref(), Some("rw"));
        assert_eq!(cursor.next_match().as_deref(), Some("nosuid"));
        assert_eq!(cursor.next_match().as_deref(), Some("anonuid=99"));
        assert_eq!(cursor.next_match(), None);
    }
}
