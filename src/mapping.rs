//! Host name to target mappings and change detection.

use crate::error::EntryError;
use std::collections::BTreeMap;
use std::collections::btree_map;

/// A single `name -> target` pair as written to the hosts file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    /// Lookup key, a DNS-style hostname (e.g., `"api.dev.local"`).
    pub name: String,

    /// Resolution payload, usually an IP address.
    pub target: String,
}

impl HostEntry {
    /// Creates an entry, rejecting values that would not survive a
    /// render/parse cycle through the hosts file.
    ///
    /// # Errors
    ///
    /// Returns [`EntryError`] if either value is empty or contains
    /// whitespace.
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Result<Self, EntryError> {
        let name = name.into();
        let target = target.into();

        if name.is_empty() {
            return Err(EntryError::EmptyName);
        }
        if target.is_empty() {
            return Err(EntryError::EmptyTarget { name });
        }
        for value in [&name, &target] {
            if value.chars().any(char::is_whitespace) {
                return Err(EntryError::Whitespace {
                    value: value.clone(),
                });
            }
        }
        Ok(Self { name, target })
    }
}

/// Desired `name -> target` state at one point in time.
///
/// Equality ignores insertion order. Iteration is sorted by name, which
/// keeps rendered output deterministic.
///
/// # Example
///
/// ```
/// use hosts_reconciler::HostMapping;
///
/// let a = HostMapping::from_pairs([("a.local", "10.0.0.1"), ("b.local", "10.0.0.2")])?;
/// let b = HostMapping::from_pairs([("b.local", "10.0.0.2"), ("a.local", "10.0.0.1")])?;
/// assert_eq!(a, b);
/// # Ok::<(), hosts_reconciler::EntryError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostMapping {
    entries: BTreeMap<String, String>,
}

impl HostMapping {
    /// Creates an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mapping from `(name, target)` pairs. Later pairs win.
    ///
    /// # Errors
    ///
    /// Returns the first [`EntryError`] among the pairs.
    pub fn from_pairs<I, N, T>(pairs: I) -> Result<Self, EntryError>
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Into<String>,
    {
        let mut mapping = Self::new();
        for (name, target) in pairs {
            mapping.insert(HostEntry::new(name, target)?);
        }
        Ok(mapping)
    }

    /// Inserts an entry, returning the target it replaced.
    pub fn insert(&mut self, entry: HostEntry) -> Option<String> {
        self.entries.insert(entry.name, entry.target)
    }

    /// Returns the target for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the mapping has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(name, target)` pairs in name order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.entries.iter(),
        }
    }
}

impl FromIterator<HostEntry> for HostMapping {
    fn from_iter<I: IntoIterator<Item = HostEntry>>(iter: I) -> Self {
        let mut mapping = Self::new();
        for entry in iter {
            mapping.insert(entry);
        }
        mapping
    }
}

impl<'a> IntoIterator for &'a HostMapping {
    type Item = (&'a str, &'a str);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the entries of a [`HostMapping`].
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    inner: btree_map::Iter<'a, String, String>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(name, target)| (name.as_str(), target.as_str()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Returns `true` if `new` differs from `old` in any key or target.
#[must_use]
pub fn changed(old: &HostMapping, new: &HostMapping) -> bool {
    old != new
}
