//! Custom tracker matchers
//!
//! A *custom tracker* is a named label selector whose current active series
//! count is exported alongside the total. Operators configure trackers as
//! `name:{selector}` entries; this module parses and compiles them into a
//! [`Matchers`] set that evaluates a label set against every tracker in one
//! pass.
//!
//! Matching follows Prometheus semantics: a matcher tests the value of its
//! label in the series, an absent label reads as the empty string, and regex
//! matchers are fully anchored. All matchers within one selector must hold
//! for the tracker to match (AND).

mod parser;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::labels::LabelSet;

// ============================================================================
// Matcher
// ============================================================================

/// Label matching operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    /// Exact equality: `label="value"`
    Eq,
    /// Inequality: `label!="value"`
    Ne,
    /// Anchored regex match: `label=~"pattern"`
    Re,
    /// Anchored regex non-match: `label!~"pattern"`
    NotRe,
}

impl fmt::Display for MatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            MatchOp::Eq => "=",
            MatchOp::Ne => "!=",
            MatchOp::Re => "=~",
            MatchOp::NotRe => "!~",
        };
        write!(f, "{op}")
    }
}

/// A single compiled label matcher
#[derive(Debug, Clone)]
pub struct Matcher {
    name: String,
    op: MatchOp,
    value: String,
    /// Compiled only for `Re` / `NotRe`
    re: Option<Regex>,
}

impl Matcher {
    /// Compile a matcher; regex values are anchored as `^(?:value)$`
    pub fn new(name: impl Into<String>, op: MatchOp, value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let re = match op {
            MatchOp::Re | MatchOp::NotRe => Some(
                Regex::new(&format!("^(?:{value})$")).map_err(|source| Error::InvalidRegex {
                    pattern: value.clone(),
                    source,
                })?,
            ),
            MatchOp::Eq | MatchOp::Ne => None,
        };
        Ok(Self {
            name: name.into(),
            op,
            value,
            re,
        })
    }

    /// The label name this matcher tests
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Test a raw label value
    pub fn matches_value(&self, value: &str) -> bool {
        match self.op {
            MatchOp::Eq => value == self.value,
            MatchOp::Ne => value != self.value,
            // re is always Some for regex ops, set in the constructor
            MatchOp::Re => self.re.as_ref().is_some_and(|re| re.is_match(value)),
            MatchOp::NotRe => !self.re.as_ref().is_some_and(|re| re.is_match(value)),
        }
    }

    /// Test a series; an absent label reads as the empty string
    pub fn matches(&self, series: &LabelSet) -> bool {
        self.matches_value(series.get(&self.name).unwrap_or(""))
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:?}", self.name, self.op, self.value)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Custom tracker configuration: tracker name → selector string
///
/// The map form keeps trackers ordered by name, which fixes the order of
/// [`Matchers::matcher_names`] and of every per-tracker count vector derived
/// from it. Every selector is validated (parsed and regex-compiled) at
/// construction, so a stored config always compiles.
///
/// Two source formats are accepted:
/// - a serde map, e.g. from TOML: `api = '{job="api"}'`
/// - the flag form via [`FromStr`]: `api:{job="api"};web:{job=~"web-.*"}`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, String>",
    into = "BTreeMap<String, String>"
)]
pub struct CustomTrackersConfig {
    source: BTreeMap<String, String>,
}

impl CustomTrackersConfig {
    /// Build a validated config from a name → selector map
    pub fn from_map(source: BTreeMap<String, String>) -> Result<Self> {
        for (name, selector) in &source {
            if name.is_empty() {
                return Err(Error::InvalidConfig(
                    "custom tracker with an empty name".to_string(),
                ));
            }
            if selector.is_empty() {
                return Err(Error::EmptyTracker(name.clone()));
            }
            compile_selector(selector)?;
        }
        Ok(Self { source })
    }

    /// Tracker count
    pub fn len(&self) -> usize {
        self.source.len()
    }

    /// Whether no trackers are configured
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Iterate `(name, selector)` pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.source
            .iter()
            .map(|(name, selector)| (name.as_str(), selector.as_str()))
    }
}

impl TryFrom<BTreeMap<String, String>> for CustomTrackersConfig {
    type Error = Error;

    fn try_from(source: BTreeMap<String, String>) -> Result<Self> {
        Self::from_map(source)
    }
}

impl From<CustomTrackersConfig> for BTreeMap<String, String> {
    fn from(config: CustomTrackersConfig) -> Self {
        config.source
    }
}

impl FromStr for CustomTrackersConfig {
    type Err = Error;

    /// Parse the flag form: `name1:{selector};name2:{selector}`
    fn from_str(s: &str) -> Result<Self> {
        let mut source = BTreeMap::new();
        for part in s.split(';').map(str::trim).filter(|part| !part.is_empty()) {
            let (name, selector) = part.split_once(':').ok_or_else(|| {
                Error::InvalidConfig(format!("expected name:{{selector}}, got {part:?}"))
            })?;
            let name = name.trim();
            let selector = selector.trim();
            if source
                .insert(name.to_string(), selector.to_string())
                .is_some()
            {
                return Err(Error::DuplicateTracker(name.to_string()));
            }
        }
        Self::from_map(source)
    }
}

impl fmt::Display for CustomTrackersConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (name, selector)) in self.source.iter().enumerate() {
            if idx > 0 {
                write!(f, ";")?;
            }
            write!(f, "{name}:{selector}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Compiled matcher set
// ============================================================================

/// A compiled set of custom tracker matchers
///
/// Evaluation order is stable for the lifetime of the set: index `i` of
/// [`Matchers::matches`] corresponds to `matcher_names()[i]`. Replacing the
/// whole `Matchers` object (via
/// [`ActiveSeries::reload_matchers`](crate::ActiveSeries::reload_matchers))
/// is the only way the length changes.
#[derive(Debug, Clone, Default)]
pub struct Matchers {
    config: CustomTrackersConfig,
    names: Vec<String>,
    trackers: Vec<Vec<Matcher>>,
}

impl Matchers {
    /// Compile a matcher set from a validated config
    pub fn new(config: CustomTrackersConfig) -> Result<Self> {
        let mut names = Vec::with_capacity(config.len());
        let mut trackers = Vec::with_capacity(config.len());
        for (name, selector) in config.iter() {
            names.push(name.to_string());
            trackers.push(compile_selector(selector)?);
        }
        Ok(Self {
            config,
            names,
            trackers,
        })
    }

    /// A matcher set with no trackers
    pub fn empty() -> Self {
        Self::default()
    }

    /// Tracker names, in the same order as [`Matchers::matches`] output
    pub fn matcher_names(&self) -> &[String] {
        &self.names
    }

    /// Evaluate every tracker against a series
    ///
    /// Returns one boolean per tracker, aligned with `matcher_names()`.
    /// A tracker matches when all matchers in its selector hold.
    pub fn matches(&self, series: &LabelSet) -> Vec<bool> {
        self.trackers
            .iter()
            .map(|matchers| matchers.iter().all(|matcher| matcher.matches(series)))
            .collect()
    }

    /// The configuration this set was compiled from
    pub fn config(&self) -> &CustomTrackersConfig {
        &self.config
    }

    /// Tracker count
    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    /// Whether no trackers are configured
    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }
}

/// Parse and compile one selector string into its matcher list
fn compile_selector(selector: &str) -> Result<Vec<Matcher>> {
    parser::parse_selector(selector)?
        .into_iter()
        .map(|(name, op, value)| Matcher::new(name, op, value))
        .collect()
}
