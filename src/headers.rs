//! Header blocks.
//!
//! A header block is an ordered sequence of name/value pairs where a
//! bounded prefix may be pseudo-headers (names starting with `:` carrying
//! protocol metadata). Pseudo-headers must precede all regular headers,
//! and trailer blocks must not carry them at all.
//!
//! [`HeaderView`] is a borrowed, read-only variant backed by externally
//! owned arrays: it never copies and rejects all mutation.

use crate::error::{Error, Result};
use std::fmt;

/// Pseudo-header carrying the request method
pub const PSEUDO_METHOD: &str = ":method";
/// Pseudo-header carrying the request path
pub const PSEUDO_PATH: &str = ":path";
/// Pseudo-header carrying the request scheme
pub const PSEUDO_SCHEME: &str = ":scheme";
/// Pseudo-header carrying the request authority
pub const PSEUDO_AUTHORITY: &str = ":authority";
/// Pseudo-header carrying the response status
pub const PSEUDO_STATUS: &str = ":status";

/// All pseudo-header names this protocol defines
pub const PSEUDO_HEADERS: [&str; 5] = [
    PSEUDO_METHOD,
    PSEUDO_PATH,
    PSEUDO_SCHEME,
    PSEUDO_AUTHORITY,
    PSEUDO_STATUS,
];

/// Check whether a name is in the reserved pseudo-header space
pub fn is_pseudo(name: &str) -> bool {
    name.starts_with(':')
}

/// Owned, mutable header block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderBlock {
    entries: Vec<(String, String)>,
}

impl HeaderBlock {
    /// Create an empty header block
    pub fn new() -> Self {
        HeaderBlock {
            entries: Vec::new(),
        }
    }

    /// Append a header.
    ///
    /// Multiple values for the same name are kept as distinct entries in
    /// insertion order.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Get the first value for a header (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get all values for a header (case-insensitive)
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Count how many times a header appears
    pub fn count(&self, name: &str) -> usize {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .count()
    }

    /// Check if a header exists
    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Remove all instances of a header, returning how many were removed
    pub fn remove(&mut self, name: &str) -> usize {
        let initial_len = self.entries.len();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        initial_len - self.entries.len()
    }

    /// Get the number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries.
    ///
    /// Restartable: every call yields a fresh iterator with no shared
    /// cursor state.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Validate the pseudo-header rules for an initial header block
    pub fn validate(&self) -> Result<()> {
        validate_entries(self.iter(), false)
    }

    /// Validate a trailer block (no pseudo-headers permitted)
    pub fn validate_trailers(&self) -> Result<()> {
        validate_entries(self.iter(), true)
    }
}

fn validate_entries<'a>(
    entries: impl Iterator<Item = (&'a str, &'a str)>,
    trailers: bool,
) -> Result<()> {
    let mut seen_regular = false;
    for (name, _) in entries {
        if is_pseudo(name) {
            if trailers {
                return Err(Error::Translation(format!(
                    "Pseudo-header {} not permitted in trailers",
                    name
                )));
            }
            if !PSEUDO_HEADERS.contains(&name) {
                return Err(Error::Translation(format!(
                    "Unknown pseudo-header {}",
                    name
                )));
            }
            if seen_regular {
                return Err(Error::Translation(format!(
                    "Pseudo-header {} after regular headers",
                    name
                )));
            }
        } else {
            seen_regular = true;
        }
    }
    Ok(())
}

impl fmt::Display for HeaderBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            writeln!(f, "{}: {}", name, value)?;
        }
        Ok(())
    }
}

impl FromIterator<(String, String)> for HeaderBlock {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut block = HeaderBlock::new();
        for (name, value) in iter {
            block.insert(name, value);
        }
        block
    }
}

/// Borrowed, read-only header view backed by externally owned arrays.
///
/// The lifetime ties the view to its backing storage; nothing is copied.
/// Mutation entry points exist for API symmetry but always fail with
/// [`Error::ReadOnlyHeaders`].
#[derive(Debug, Clone, Copy)]
pub struct HeaderView<'a> {
    entries: &'a [(&'a str, &'a str)],
}

impl<'a> HeaderView<'a> {
    /// Create a view over externally owned entries
    pub fn new(entries: &'a [(&'a str, &'a str)]) -> Self {
        HeaderView { entries }
    }

    /// Get the first value for a header (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v)
    }

    /// Get all values for a header (case-insensitive)
    pub fn get_all(&self, name: &str) -> Vec<&'a str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v)
            .collect()
    }

    /// Get the number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries; restartable, no shared cursor
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a str)> + '_ {
        self.entries.iter().copied()
    }

    /// Mutation is unsupported on a view
    pub fn insert(&mut self, _name: &str, _value: &str) -> Result<()> {
        Err(Error::ReadOnlyHeaders)
    }

    /// Mutation is unsupported on a view
    pub fn remove(&mut self, _name: &str) -> Result<usize> {
        Err(Error::ReadOnlyHeaders)
    }

    /// Copy the view into an owned block
    pub fn to_owned_block(&self) -> HeaderBlock {
        self.entries
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    /// Validate the pseudo-header rules for an initial header block
    pub fn validate(&self) -> Result<()> {
        validate_entries(self.iter(), false)
    }
}
