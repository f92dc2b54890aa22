//! An insertion-ordered index of archive entries with name lookup.

use std::collections::HashMap;
use std::slice;

use crate::entry::ZipEntry;

/// How [`Index::get`] (and the collection facades) match a queried name
/// against entry names.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MatchMode {
    /// The query must equal the entry name exactly.
    Ignore,
    /// The query may also match the trailing path components of an
    /// entry name: `x.h` matches both `x.h` and `src/lib/x.h`,
    /// but not `libx.h`.
    Match,
}

/// Entries in insertion order, plus a name map for exact lookups.
///
/// Archives are small enough that the tail-match mode just scans;
/// only the exact-match path gets the hash map.
#[derive(Debug, Default)]
pub struct Index {
    entries: Vec<ZipEntry>,
    by_name: HashMap<String, usize>,
}

/// True if the query matches the trailing path components of `name`.
fn tail_matches(name: &str, query: &str) -> bool {
    name.len() > query.len()
        && name.ends_with(query)
        && name.as_bytes()[name.len() - query.len() - 1] == b'/'
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            by_name: HashMap::with_capacity(capacity),
        }
    }

    /// Appends an entry. If the name is a duplicate, the earlier entry
    /// keeps winning lookups (first hit in insertion order).
    pub fn push(&mut self, entry: ZipEntry) {
        let position = self.entries.len();
        self.by_name.entry(entry.name.clone()).or_insert(position);
        self.entries.push(entry);
    }

    /// Looks an entry up by name. `MatchMode::Ignore` is an exact
    /// comparison; `MatchMode::Match` also accepts path-tail matches.
    /// Either way the first hit in insertion order wins, so tail mode
    /// must scan: an exact-name entry inserted later never shadows an
    /// earlier tail match.
    pub fn get(&self, name: &str, mode: MatchMode) -> Option<&ZipEntry> {
        match mode {
            MatchMode::Ignore => self
                .by_name
                .get(name)
                .map(|&position| &self.entries[position]),
            MatchMode::Match => self
                .entries
                .iter()
                .find(|entry| entry.name == name || tail_matches(&entry.name, name)),
        }
    }

    /// The entries, in insertion order.
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    pub fn iter(&self) -> slice::Iter<'_, ZipEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a Index {
    type Item = &'a ZipEntry;
    type IntoIter = slice::Iter<'a, ZipEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
