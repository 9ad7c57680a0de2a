//! Merged, immutable configuration.
//!
//! Keys are hierarchical paths separated by [`KEY_DELIMITER`] and compare
//! case-insensitively. The first source to introduce a key fixes its display
//! casing; later sources only replace the value.

use std::collections::BTreeMap;
use std::fmt;

/// Separator between the segments of a key path.
pub const KEY_DELIMITER: &str = ":";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    key: String,
    value: String,
}

/// Key/value settings produced by folding configuration sources in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedConfiguration {
    /// Lowercased key path -> entry. BTreeMap keeps iteration deterministic.
    entries: BTreeMap<String, Entry>,
}

impl MergedConfiguration {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key, overriding any value contributed by an earlier source.
    pub(crate) fn insert(&mut self, key: &str, value: String) {
        let key = normalize_path(key);
        if key.is_empty() {
            return;
        }
        self.entries
            .entry(key.to_ascii_lowercase())
            .and_modify(|entry| entry.value = value.clone())
            .or_insert(Entry { key, value });
    }

    /// Look up a value by its full key path.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&normalize_path(key).to_ascii_lowercase())
            .map(|entry| entry.value.as_str())
    }

    /// Borrow the sub-tree rooted at `path`.
    pub fn section(&self, path: &str) -> Section<'_> {
        Section {
            config: self,
            path: normalize_path(path),
        }
    }

    /// Iterate over `(key, value)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|entry| (entry.key.as_str(), entry.value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Canonical rendering: one `key=value` line per entry, sorted by key.
impl fmt::Display for MergedConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in self.iter() {
            writeln!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

/// A borrowed view of every key below a path.
#[derive(Debug, Clone)]
pub struct Section<'a> {
    config: &'a MergedConfiguration,
    path: String,
}

impl<'a> Section<'a> {
    /// Full key path of this section (empty for the root).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Value stored directly at the section path, if any.
    pub fn value(&self) -> Option<&'a str> {
        if self.path.is_empty() {
            return None;
        }
        self.config.get(&self.path)
    }

    /// Look up a key relative to this section.
    pub fn get(&self, relative: &str) -> Option<&'a str> {
        self.config.get(&join_path(&self.path, relative))
    }

    /// Whether the section has a value or any descendant.
    pub fn exists(&self) -> bool {
        self.value().is_some() || self.entries().next().is_some()
    }

    /// Descendant entries as `(relative key, value)` pairs, in canonical order.
    pub fn entries(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        let prefix = if self.path.is_empty() {
            String::new()
        } else {
            format!("{}{}", self.path.to_ascii_lowercase(), KEY_DELIMITER)
        };
        let skip = prefix.len();
        self.config
            .entries
            .range(prefix.clone()..)
            .take_while(move |(lower, _)| lower.starts_with(&prefix))
            .filter_map(move |(_, entry)| {
                entry
                    .key
                    .get(skip..)
                    .map(|relative| (relative, entry.value.as_str()))
            })
    }

    /// Distinct immediate child segments.
    pub fn children(&self) -> Vec<&'a str> {
        let mut children: Vec<&'a str> = Vec::new();
        for (relative, _) in self.entries() {
            let head = relative.split(KEY_DELIMITER).next().unwrap_or(relative);
            if !children.iter().any(|seen| seen.eq_ignore_ascii_case(head)) {
                children.push(head);
            }
        }
        children
    }
}

/// Join two key paths, tolerating an empty parent.
pub fn join_path(parent: &str, child: &str) -> String {
    match (parent.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => parent.to_string(),
        _ => format!("{parent}{KEY_DELIMITER}{child}"),
    }
}

fn normalize_path(path: &str) -> String {
    path.trim_matches(|c| c == ':').to_string()
}
