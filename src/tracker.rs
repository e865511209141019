//! Tenant-scoped active series tracker
//!
//! [`ActiveSeries`] is the facade the ingestion path talks to. It owns the
//! fixed array of shards, the current custom tracker matchers, the idle
//! timeout, and the clock. One instance tracks one tenant.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::labels::LabelSet;
use crate::matchers::{CustomTrackersConfig, Matchers};
use crate::shard::{resize_and_zero, Shard};

/// Number of shards the series population is striped across
///
/// Writers hash to one of these, so expected contention on a single shard
/// lock is writer-rate / 512.
const NUM_SHARDS: usize = 512;

/// Injected wall-clock returning Unix nanoseconds
pub type NowFn = Box<dyn Fn() -> i64 + Send + Sync>;

/// A [`NowFn`] reading the system clock
pub fn system_clock() -> NowFn {
    Box::new(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as i64
    })
}

/// Matcher state guarded by the tracker-level lock
///
/// The lock serializes matcher swaps against counting; the per-sample hot
/// path never touches it.
struct MatcherState {
    matchers: Arc<Matchers>,
    /// Unix nanoseconds of the last [`ActiveSeries::reload_matchers`] call,
    /// `i64::MIN` before the first one.
    last_update_nanos: i64,
}

/// Active series counts reported by [`ActiveSeries::active`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSeriesCounts {
    /// Total number of active series
    pub total: usize,
    /// Active series matching each custom tracker, aligned with
    /// [`ActiveSeries::current_matcher_names`]
    pub matching: Vec<usize>,
    /// Whether enough idle time has passed since the last matcher reload
    /// for all pre-reload state to have drained. While `false`, per-tracker
    /// counts only cover series observed since the reload and callers
    /// should suppress them.
    pub valid: bool,
}

/// Tracks recently active series for a single tenant
///
/// Every incoming sample calls [`ActiveSeries::update_series`]; a periodic
/// caller (typically the metrics exposition path) calls
/// [`ActiveSeries::active`], which also purges idle series. There is no
/// background task: memory for idle series is only reclaimed by `active`,
/// so it should be called at a regular cadence.
///
/// `active` must not be called concurrently with
/// [`ActiveSeries::reload_matchers`]; both are safe concurrently with
/// `update_series`.
pub struct ActiveSeries {
    /// Shards are pre-allocated so the hot path only ever reads this vector.
    shards: Vec<Shard>,
    state: RwLock<MatcherState>,
    timeout_nanos: i64,
    now: NowFn,
}

impl ActiveSeries {
    /// Create a tracker with the given matcher set, idle timeout and clock
    pub fn new(matchers: Matchers, idle_timeout: Duration, now: NowFn) -> Self {
        let matchers = Arc::new(matchers);
        let shards = (0..NUM_SHARDS)
            .map(|_| Shard::new(Arc::clone(&matchers)))
            .collect();
        debug!(
            trackers = matchers.matcher_names().len(),
            idle_timeout_secs = idle_timeout.as_secs(),
            "created active series tracker"
        );
        Self {
            shards,
            state: RwLock::new(MatcherState {
                matchers,
                last_update_nanos: i64::MIN,
            }),
            timeout_nanos: idle_timeout.as_nanos() as i64,
            now,
        }
    }

    /// Record that `series` was observed at `now_nanos`
    ///
    /// Safe to call from any number of concurrent writers; only the lock of
    /// the shard the series hashes to is involved. `labels_copy` produces
    /// the owned copy stored in the tracker and is invoked at most once per
    /// distinct series.
    pub fn update_series<F>(&self, series: &LabelSet, now_nanos: i64, labels_copy: F)
    where
        F: FnOnce(&LabelSet) -> LabelSet,
    {
        let fingerprint = series.fingerprint();
        let shard = &self.shards[(fingerprint % NUM_SHARDS as u64) as usize];
        shard.update_series_timestamp(now_nanos, series, fingerprint, labels_copy);
    }

    /// Purge series idle past the timeout, then count what remains
    ///
    /// The purge cutoff is `now_nanos - idle_timeout`. Must be called
    /// periodically to bound memory. Not safe to call concurrently with
    /// [`ActiveSeries::reload_matchers`].
    pub fn active(&self, now_nanos: i64) -> ActiveSeriesCounts {
        let state = self.state.write();
        let purge_cutoff = now_nanos - self.timeout_nanos;

        for shard in &self.shards {
            shard.purge(purge_cutoff);
        }

        let mut matching = resize_and_zero(state.matchers.matcher_names().len(), Vec::new());
        let mut total = 0;
        for shard in &self.shards {
            total += shard.total_and_accumulate(&mut matching);
        }

        ActiveSeriesCounts {
            total,
            matching,
            valid: purge_cutoff > state.last_update_nanos,
        }
    }

    /// Replace the custom tracker matcher set
    ///
    /// Discards all tracked series: precomputed match vectors are stale
    /// against the new set and the per-tracker counters change width, so
    /// the store refills from live traffic instead of being recomputed.
    /// [`ActiveSeriesCounts::valid`] stays `false` until one idle timeout
    /// has elapsed past this call. Must be serialized against
    /// [`ActiveSeries::active`].
    pub fn reload_matchers(&self, matchers: Matchers) {
        let mut state = self.state.write();
        let matchers = Arc::new(matchers);
        for shard in &self.shards {
            shard.reinitialize(Arc::clone(&matchers));
        }
        state.last_update_nanos = (self.now)();
        info!(
            trackers = matchers.matcher_names().len(),
            "reloaded custom tracker matchers, discarding tracked series"
        );
        state.matchers = matchers;
    }

    /// Names of the configured custom trackers, in count-vector order
    pub fn current_matcher_names(&self) -> Vec<String> {
        self.state.read().matchers.matcher_names().to_vec()
    }

    /// Snapshot of the configuration the current matcher set was built from
    pub fn current_config(&self) -> CustomTrackersConfig {
        self.state.read().matchers.config().clone()
    }

    /// Drop all tracked series, keeping the current matcher set
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(pairs: &[(&str, &str)]) -> LabelSet {
        LabelSet::from_pairs(pairs).unwrap()
    }

    fn matchers(flag: &str) -> Matchers {
        Matchers::new(flag.parse().unwrap()).unwrap()
    }

    fn fixed_clock(nanos: i64) -> NowFn {
        Box::new(move || nanos)
    }

    const TIMEOUT: Duration = Duration::from_nanos(1_000);

    #[test]
    fn test_update_and_active() {
        let tracker = ActiveSeries::new(matchers(r#"api:{job="api"}"#), TIMEOUT, fixed_clock(0));

        tracker.update_series(&series(&[("job", "api")]), 100, LabelSet::clone);
        tracker.update_series(&series(&[("job", "web")]), 100, LabelSet::clone);

        let counts = tracker.active(200);
        assert_eq!(counts.total, 2);
        assert_eq!(counts.matching, vec![1]);
        assert!(counts.valid);
    }

    #[test]
    fn test_idle_series_expire() {
        let tracker = ActiveSeries::new(Matchers::empty(), TIMEOUT, fixed_clock(0));

        tracker.update_series(&series(&[("job", "api")]), 100, LabelSet::clone);

        // Still inside the window.
        assert_eq!(tracker.active(1_100).total, 1);
        // One past the window: cutoff 101 > 100.
        assert_eq!(tracker.active(1_101).total, 0);
    }

    #[test]
    fn test_reload_discards_and_flips_valid() {
        let tracker = ActiveSeries::new(matchers(r#"api:{job="api"}"#), TIMEOUT, fixed_clock(500));

        for idx in 0..10 {
            let s = series(&[("job", "api"), ("instance", &format!("i{idx}"))]);
            tracker.update_series(&s, 400, LabelSet::clone);
        }
        assert_eq!(tracker.active(500).total, 10);

        tracker.reload_matchers(matchers(r#"web:{job="web"}"#));
        assert_eq!(tracker.current_matcher_names(), vec!["web"]);

        // Reload (at now=500 via the clock) empties everything.
        let counts = tracker.active(600);
        assert_eq!(counts.total, 0);
        assert_eq!(counts.matching, vec![0]);
        // cutoff = 600 - 1000 < 500: pre-reload series could still linger.
        assert!(!counts.valid);

        // Once the cutoff passes the reload time the flag recovers.
        let counts = tracker.active(1_501);
        assert!(counts.valid);
    }

    #[test]
    fn test_current_config_snapshot() {
        let config: CustomTrackersConfig = r#"api:{job="api"}"#.parse().unwrap();
        let tracker = ActiveSeries::new(
            Matchers::new(config.clone()).unwrap(),
            TIMEOUT,
            fixed_clock(0),
        );
        assert_eq!(tracker.current_config(), config);
    }

    #[test]
    fn test_clear_keeps_matchers() {
        let tracker = ActiveSeries::new(matchers(r#"api:{job="api"}"#), TIMEOUT, fixed_clock(0));
        tracker.update_series(&series(&[("job", "api")]), 100, LabelSet::clone);

        tracker.clear();
        let counts = tracker.active(200);
        assert_eq!(counts.total, 0);
        assert_eq!(counts.matching, vec![0]);
        assert_eq!(tracker.current_matcher_names(), vec!["api"]);
    }
}
