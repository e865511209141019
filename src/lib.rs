//! Active series tracking for multi-tenant metrics ingestion
//!
//! This library keeps a per-tenant, in-memory index of every distinct time
//! series an ingestion node has recently seen, and answers "how many series
//! are active right now?" both in total and broken down by operator-defined
//! label matchers (custom trackers).
//!
//! - Lock-striped across 512 shards so concurrent writers rarely contend
//! - Per-series timestamps advanced with a compare-and-swap under a shard
//!   read-lock, so the warmed hot path never takes a write-lock
//! - Idle series expired on demand during [`ActiveSeries::active`], with a
//!   per-shard oldest-timestamp hint that lets purge skip untouched shards
//! - Custom tracker matchers are swappable at runtime; a reload discards
//!   tracked state and the refill window is reported via a validity flag
//!
//! # Example
//!
//! ```rust
//! use activeset::{ActiveSeries, CustomTrackersConfig, LabelSet, Matchers};
//! use std::time::Duration;
//!
//! let config: CustomTrackersConfig = r#"api:{job="api"}"#.parse().unwrap();
//! let matchers = Matchers::new(config).unwrap();
//! let tracker = ActiveSeries::new(
//!     matchers,
//!     Duration::from_secs(600),
//!     activeset::tracker::system_clock(),
//! );
//!
//! let series = LabelSet::from_pairs(&[("__name__", "up"), ("job", "api")]).unwrap();
//! tracker.update_series(&series, 1_000_000_000, LabelSet::clone);
//!
//! let counts = tracker.active(1_500_000_000);
//! assert_eq!(counts.total, 1);
//! assert_eq!(counts.matching, vec![1]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod labels;
pub mod matchers;
pub mod tracker;

mod shard;

// Re-export main types
pub use config::ActiveSeriesConfig;
pub use error::{Error, Result};
pub use labels::{Label, LabelSet};
pub use matchers::{CustomTrackersConfig, MatchOp, Matcher, Matchers};
pub use tracker::{ActiveSeries, ActiveSeriesCounts, NowFn};
