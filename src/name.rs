//! Domain names.
//!
//! This module provides [`Name`], the owned, wire-encoded representation of a
//! DNS domain name used throughout the zone store, and [`NameTable`], the
//! reference-counted interning table that gives every node in a zone a single
//! shared owner name.
//!
//! Names are compared case-insensitively and ordered per the canonical DNS
//! ordering of RFC 4034 §6.1 (labels compared from the root outward, treating
//! the absence of a label as sorting before any octet value). This is the
//! order the zone tree and the prune walk in the applicator both rely on.

use std::{
    cmp::Ordering,
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use bytes::Bytes;

//----------- Name --------------------------------------------------------------

/// An owned, wire-encoded domain name.
///
/// The wire form is a sequence of length-prefixed labels terminated by the
/// zero-length root label, exactly as it appears (post-decompression) in a
/// DNS message. [`Name`] never itself contains a compression pointer; those
/// are resolved by [`crate::wire`] before a [`Name`] is constructed.
#[derive(Clone)]
pub struct Name {
    wire: Bytes,
}

impl Name {
    /// The root name, consisting of a single zero-length label.
    pub fn root() -> Self {
        Name {
            wire: Bytes::from_static(&[0]),
        }
    }

    /// Construct a [`Name`] from already-decompressed wire bytes.
    ///
    /// Fails if the labels are malformed (an out-of-range length, a label
    /// exceeding 63 octets, or a total name exceeding 255 octets).
    pub fn from_wire(wire: Bytes) -> Result<Self, NameError> {
        let mut pos = 0;
        let mut labels = 0u32;
        loop {
            let Some(&len) = wire.get(pos) else {
                return Err(NameError::Truncated);
            };
            if len & 0xC0 != 0 {
                // A compression pointer has no business appearing here.
                return Err(NameError::Compressed);
            }
            let len = len as usize;
            if len == 0 {
                pos += 1;
                break;
            }
            if len > 63 {
                return Err(NameError::LabelTooLong);
            }
            if wire.len() < pos + 1 + len {
                return Err(NameError::Truncated);
            }
            pos += 1 + len;
            labels += 1;
            if pos > 255 {
                return Err(NameError::TooLong);
            }
        }
        if pos != wire.len() {
            return Err(NameError::TrailingData);
        }
        let _ = labels;
        Ok(Name { wire })
    }

    /// The raw wire-format bytes of this name.
    pub fn as_wire(&self) -> &[u8] {
        &self.wire
    }

    /// Whether this is the root name.
    pub fn is_root(&self) -> bool {
        self.wire.len() == 1
    }

    /// Iterate over the labels of this name, from the leftmost (most
    /// specific) label down to (but excluding) the root label.
    pub fn labels(&self) -> LabelIter<'_> {
        LabelIter {
            buf: &self.wire,
            pos: 0,
        }
    }

    /// The number of non-root labels in this name.
    pub fn label_count(&self) -> usize {
        self.labels().count()
    }

    /// The immediate parent of this name, or `None` if this is the root.
    pub fn parent(&self) -> Option<Name> {
        let first_len = *self.wire.first()? as usize;
        if first_len == 0 {
            return None;
        }
        Some(Name {
            wire: self.wire.slice(first_len + 1..),
        })
    }

    /// Whether `self` is equal to, or a proper descendant of, `other`.
    pub fn ends_with(&self, other: &Name) -> bool {
        let mut current = self.clone();
        loop {
            if current.eq_ignore_case(other) {
                return true;
            }
            match current.parent() {
                Some(p) => current = p,
                None => return false,
            }
        }
    }

    fn eq_ignore_case(&self, other: &Name) -> bool {
        self.labels().eq_by(other.labels(), |a, b| {
            a.len() == b.len() && a.eq_ignore_ascii_case(b)
        })
    }

    /// The labels of this name, closest-to-root first, lowercased. Used for
    /// canonical ordering and for building a canonical hash.
    fn canonical_labels(&self) -> Vec<Vec<u8>> {
        let mut v: Vec<_> = self.labels().map(|l| l.to_ascii_lowercase()).collect();
        v.reverse();
        v
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({self})")
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        for label in self.labels() {
            for &b in label {
                if b.is_ascii_graphic() && !matches!(b, b'.' | b'\\') {
                    write!(f, "{}", b as char)?;
                } else {
                    write!(f, "\\{b:03}")?;
                }
            }
            f.write_str(".")?;
        }
        Ok(())
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.eq_ignore_case(other)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for label in self.canonical_labels() {
            label.hash(state);
        }
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    /// Canonical DNS name ordering (RFC 4034 §6.1): labels are compared from
    /// the root outward, and a name that runs out of labels first sorts
    /// before one that doesn't. This means a parent always sorts before its
    /// descendants, which the applicator's post-order prune walk relies on.
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.canonical_labels();
        let b = other.canonical_labels();
        for (la, lb) in a.iter().zip(b.iter()) {
            match la.cmp(lb) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        a.len().cmp(&b.len())
    }
}

//----------- LabelIter ----------------------------------------------------------

/// An iterator over the labels of a [`Name`], excluding the root label.
pub struct LabelIter<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for LabelIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let len = *self.buf.get(self.pos)? as usize;
        if len == 0 {
            return None;
        }
        let start = self.pos + 1;
        let label = &self.buf[start..start + len];
        self.pos = start + len;
        Some(label)
    }
}

impl<'a> LabelIter<'a> {
    fn eq_by(mut self, mut other: LabelIter<'a>, eq: impl Fn(&[u8], &[u8]) -> bool) -> bool {
        loop {
            match (self.next(), other.next()) {
                (None, None) => return true,
                (Some(a), Some(b)) if eq(a, b) => continue,
                _ => return false,
            }
        }
    }
}

//----------- NameError -----------------------------------------------------------

/// An error constructing a [`Name`] from wire bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameError {
    /// The buffer ended before a complete name was read.
    Truncated,
    /// A label length byte indicated a compression pointer.
    Compressed,
    /// A label exceeded the 63-octet maximum.
    LabelTooLong,
    /// The name exceeded the 255-octet maximum.
    TooLong,
    /// There was data left over after the root label.
    TrailingData,
}

impl std::error::Error for NameError {}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameError::Truncated => f.write_str("name was truncated"),
            NameError::Compressed => f.write_str("name contained an unresolved compression pointer"),
            NameError::LabelTooLong => f.write_str("a label exceeded 63 octets"),
            NameError::TooLong => f.write_str("name exceeded 255 octets"),
            NameError::TrailingData => f.write_str("trailing data after the root label"),
        }
    }
}

//----------- NameTable -----------------------------------------------------------

/// A reference-counted interning table for owner names.
///
/// Every node in a zone references its owner name through this table, so
/// that a name's lifetime is the longest-lived node (or pending reference)
/// holding it, per the Lifecycle rules of the zone data model. Cloning the
/// table (as happens in [`crate::contents::ZoneContents::shallow_copy`])
/// only bumps reference counts; it never duplicates name bytes.
#[derive(Clone, Default)]
pub struct NameTable {
    names: HashMap<NameKey, Arc<Name>>,
}

/// A hashable, case-insensitive key wrapping a [`Name`]'s wire bytes.
#[derive(Clone)]
struct NameKey(Name);

impl PartialEq for NameKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for NameKey {}
impl Hash for NameKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl NameTable {
    /// Construct an empty [`NameTable`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `name`, returning the shared handle for it.
    ///
    /// If an equal name is already interned, its existing handle is cloned
    /// (bumping its reference count) and `name` is dropped.
    pub fn intern(&mut self, name: Name) -> Arc<Name> {
        if let Some(existing) = self.names.get(&NameKey(name.clone())) {
            return existing.clone();
        }
        let arc = Arc::new(name.clone());
        self.names.insert(NameKey(name), arc.clone());
        arc
    }

    /// Look up an already-interned name without inserting it.
    pub fn get(&self, name: &Name) -> Option<&Arc<Name>> {
        self.names.get(&NameKey(name.clone()))
    }

    /// The number of distinct names currently interned.
    ///
    /// This counts table entries, not reference counts; names dropped by all
    /// holders but not yet swept (the table never actively sweeps — entries
    /// are only replaced, never removed, since a name's `Arc` strong count
    /// reaching the table's own clone is harmless to retain) still count.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
