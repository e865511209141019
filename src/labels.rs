//! Canonical label sets and series fingerprints
//!
//! A series is identified by its full label set. Label sets are stored in
//! canonical form (sorted by label name, no duplicates) so that equality is
//! structural and the fingerprint is order-independent.

use std::fmt;

use xxhash_rust::xxh3::Xxh3;

use crate::error::{Error, Result};

/// Separator byte hashed between label components. 0xFF cannot appear in
/// valid UTF-8, so `{"ab": "c"}` and `{"a": "bc"}` hash differently.
const SEP: &[u8] = &[0xff];

/// A single label name/value pair
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Label {
    /// Label name
    pub name: String,
    /// Label value
    pub value: String,
}

impl Label {
    /// Create a new label
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An ordered, canonical set of labels identifying one series
///
/// Construction sorts labels by name; a duplicate label name is rejected
/// rather than silently collapsed. The tracker never mutates a `LabelSet`
/// it stores.
///
/// # Example
///
/// ```rust
/// use activeset::LabelSet;
///
/// let series = LabelSet::from_pairs(&[("job", "api"), ("__name__", "up")]).unwrap();
/// assert_eq!(series.get("job"), Some("api"));
/// assert_eq!(series.get("instance"), None);
/// assert_eq!(series.to_string(), r#"{__name__="up", job="api"}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet(Vec<Label>);

impl LabelSet {
    /// Build a canonical label set from a list of labels
    ///
    /// Labels are sorted by name. Returns [`Error::DuplicateLabel`] if the
    /// same name appears twice.
    pub fn new(mut labels: Vec<Label>) -> Result<Self> {
        labels.sort_by(|a, b| a.name.cmp(&b.name));
        for pair in labels.windows(2) {
            if pair[0].name == pair[1].name {
                return Err(Error::DuplicateLabel(pair[0].name.clone()));
            }
        }
        Ok(Self(labels))
    }

    /// Build a label set from `(name, value)` string pairs
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Result<Self> {
        Self::new(
            pairs
                .iter()
                .map(|(name, value)| Label::new(*name, *value))
                .collect(),
        )
    }

    /// Look up a label value by name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .binary_search_by(|label| label.name.as_str().cmp(name))
            .ok()
            .map(|idx| self.0[idx].value.as_str())
    }

    /// The labels in canonical (name-sorted) order
    pub fn labels(&self) -> &[Label] {
        &self.0
    }

    /// Number of labels in the set
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set has no labels
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 64-bit fingerprint of the label set
    ///
    /// XXH3 over the canonical `name, value` byte stream. Not collision-free:
    /// callers that key by fingerprint must fall back to structural equality
    /// on the full label set.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh3::new();
        for label in &self.0 {
            hasher.update(label.name.as_bytes());
            hasher.update(SEP);
            hasher.update(label.value.as_bytes());
            hasher.update(SEP);
        }
        hasher.digest()
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (idx, label) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={:?}", label.name, label.value)?;
        }
        write!(f, "}}")
    }
}
