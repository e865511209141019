//! Error types for the tracker
//!
//! The tracking hot path (update, purge, counting) is infallible by design;
//! every error in this crate surfaces at the construction boundary, when
//! label sets, matcher selectors, or configuration are first built.

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// A matcher selector failed to parse
    #[error("invalid matcher selector {selector:?}: {reason}")]
    InvalidMatcher {
        /// The selector string as given in the configuration
        selector: String,
        /// What the parser rejected
        reason: String,
    },

    /// A regex matcher value failed to compile
    #[error("invalid regular expression {pattern:?}: {source}")]
    InvalidRegex {
        /// The regex pattern as given in the selector
        pattern: String,
        /// The underlying regex compilation error
        source: regex::Error,
    },

    /// The same tracker name appeared more than once
    #[error("duplicate custom tracker name: {0}")]
    DuplicateTracker(String),

    /// A tracker was configured with an empty name or selector
    #[error("custom tracker {0:?} has an empty selector")]
    EmptyTracker(String),

    /// A label set contained the same label name twice
    #[error("duplicate label name: {0}")]
    DuplicateLabel(String),

    /// Configuration error
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// TOML parse error
    #[error("failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
