//! End-to-end tests for the active series tracker
//!
//! Drives the public API the way the ingestion path does: update series
//! against an injected clock, then count and expire via `active`.

use std::time::Duration;

use activeset::{ActiveSeries, CustomTrackersConfig, LabelSet, Matchers, NowFn};

// =============================================================================
// Test Helpers
// =============================================================================

const SECOND: i64 = 1_000_000_000;

fn series(pairs: &[(&str, &str)]) -> LabelSet {
    LabelSet::from_pairs(pairs).unwrap()
}

fn matchers(flag: &str) -> Matchers {
    let config: CustomTrackersConfig = flag.parse().unwrap();
    Matchers::new(config).unwrap()
}

fn fixed_clock(nanos: i64) -> NowFn {
    Box::new(move || nanos)
}

/// Tracker with a 10s idle timeout and a clock pinned at t=0
fn tracker_10s(m: Matchers) -> ActiveSeries {
    ActiveSeries::new(m, Duration::from_secs(10), fixed_clock(0))
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_basic_cycle() {
    let tracker = tracker_10s(Matchers::empty());
    tracker.update_series(&series(&[("__name__", "up")]), 0, LabelSet::clone);

    let counts = tracker.active(5 * SECOND);
    assert_eq!(counts.total, 1);
    assert!(counts.valid);

    let counts = tracker.active(11 * SECOND);
    assert_eq!(counts.total, 0);
    assert!(counts.matching.is_empty());
    assert!(counts.valid);
}

#[test]
fn test_two_series_one_matcher() {
    let tracker = tracker_10s(matchers(r#"a:{name="A"}"#));
    let a = series(&[("name", "A")]);
    let b = series(&[("name", "B")]);

    tracker.update_series(&a, 0, LabelSet::clone);
    tracker.update_series(&b, SECOND, LabelSet::clone);

    let counts = tracker.active(2 * SECOND);
    assert_eq!(counts.total, 2);
    assert_eq!(counts.matching, vec![1]);
    assert!(counts.valid);

    // Keep A alive; let B expire.
    tracker.update_series(&a, 20 * SECOND, LabelSet::clone);
    let counts = tracker.active(25 * SECOND);
    assert_eq!(counts.total, 1);
    assert_eq!(counts.matching, vec![1]);
    assert!(counts.valid);
}

#[test]
fn test_reload_discards_all_series() {
    let tracker = tracker_10s(matchers(r#"api:{job="api"}"#));
    for idx in 0..10 {
        let s = series(&[("job", "api"), ("instance", &format!("i{idx}"))]);
        tracker.update_series(&s, SECOND, LabelSet::clone);
    }
    assert_eq!(tracker.active(2 * SECOND).total, 10);

    tracker.reload_matchers(matchers(r#"web:{job="web"}"#));

    let counts = tracker.active(2 * SECOND);
    assert_eq!(counts.total, 0);
    assert_eq!(counts.matching, vec![0]);
    assert_eq!(tracker.current_matcher_names(), vec!["web"]);
}

#[test]
fn test_valid_flag_transitions_after_reload() {
    // Clock pinned at t=100s: the reload stamps that time.
    let tracker = ActiveSeries::new(
        matchers(r#"api:{job="api"}"#),
        Duration::from_secs(10),
        fixed_clock(100 * SECOND),
    );
    tracker.reload_matchers(matchers(r#"api:{job="api"}"#));

    // cutoff == reload time: not strictly after, still invalid.
    assert!(!tracker.active(110 * SECOND).valid);
    // cutoff strictly after the reload: valid again.
    assert!(tracker.active(110 * SECOND + 1).valid);
}

#[test]
fn test_backward_clock_keeps_series_fresh() {
    let tracker = tracker_10s(Matchers::empty());
    let a = series(&[("name", "A")]);

    tracker.update_series(&a, 100 * SECOND, LabelSet::clone);
    // Wall clock ran backward; the stored timestamp must not regress.
    tracker.update_series(&a, 90 * SECOND, LabelSet::clone);

    // cutoff = 99s: alive only if the timestamp stayed at 100s.
    assert_eq!(tracker.active(109 * SECOND).total, 1);
}

// =============================================================================
// Counting invariants
// =============================================================================

#[test]
fn test_distinct_series_count_and_matching() {
    let tracker = tracker_10s(matchers(r#"even:{parity="0"};prod:{env=~"prod-.*"}"#));

    let total = 100;
    for idx in 0..total {
        let parity = format!("{}", idx % 2);
        let env = if idx < 30 { "prod-eu" } else { "dev" };
        let s = series(&[
            ("__name__", "up"),
            ("id", &format!("{idx}")),
            ("parity", &parity),
            ("env", env),
        ]);
        tracker.update_series(&s, SECOND, LabelSet::clone);
    }

    let counts = tracker.active(2 * SECOND);
    assert_eq!(counts.total, total);
    // matcher_names() order: ["even", "prod"]
    assert_eq!(tracker.current_matcher_names(), vec!["even", "prod"]);
    assert_eq!(counts.matching, vec![50, 30]);
}

#[test]
fn test_idempotent_updates() {
    let tracker = tracker_10s(matchers(r#"a:{name="A"}"#));
    let a = series(&[("name", "A")]);

    tracker.update_series(&a, SECOND, LabelSet::clone);
    tracker.update_series(&a, SECOND, LabelSet::clone);

    let counts = tracker.active(2 * SECOND);
    assert_eq!(counts.total, 1);
    assert_eq!(counts.matching, vec![1]);
}

#[test]
fn test_timestamp_monotonic_advance() {
    let tracker = tracker_10s(Matchers::empty());
    let a = series(&[("name", "A")]);

    tracker.update_series(&a, SECOND, LabelSet::clone);
    tracker.update_series(&a, 5 * SECOND, LabelSet::clone);

    // Expiry is now relative to the advanced timestamp.
    assert_eq!(tracker.active(14 * SECOND).total, 1);
    assert_eq!(tracker.active(15 * SECOND + 1).total, 0);
}

#[test]
fn test_expiry_tie_break_keeps_boundary_series() {
    let tracker = tracker_10s(Matchers::empty());
    tracker.update_series(&series(&[("name", "A")]), 5 * SECOND, LabelSet::clone);

    // cutoff == last update: strict-less comparison keeps the series.
    assert_eq!(tracker.active(15 * SECOND).total, 1);
}

#[test]
fn test_counts_reflect_inserts_since_purge() {
    let tracker = tracker_10s(Matchers::empty());
    tracker.update_series(&series(&[("name", "A")]), SECOND, LabelSet::clone);
    assert_eq!(tracker.active(2 * SECOND).total, 1);

    // Inserts after the purge are visible to the next count.
    tracker.update_series(&series(&[("name", "B")]), 3 * SECOND, LabelSet::clone);
    assert_eq!(tracker.active(3 * SECOND).total, 2);
}

#[test]
fn test_resurrected_series_uses_current_matchers() {
    let tracker = tracker_10s(matchers(r#"api:{job="api"}"#));
    let a = series(&[("job", "api")]);

    tracker.update_series(&a, SECOND, LabelSet::clone);
    assert_eq!(tracker.active(2 * SECOND).matching, vec![1]);

    // Expire it, then observe it again: a fresh entry is created and
    // matched against the current set.
    assert_eq!(tracker.active(20 * SECOND).total, 0);
    tracker.update_series(&a, 21 * SECOND, LabelSet::clone);
    let counts = tracker.active(22 * SECOND);
    assert_eq!(counts.total, 1);
    assert_eq!(counts.matching, vec![1]);
}

#[test]
fn test_empty_tracker_reports_zeroes() {
    let tracker = tracker_10s(matchers(r#"api:{job="api"}"#));
    let counts = tracker.active(SECOND);
    assert_eq!(counts.total, 0);
    assert_eq!(counts.matching, vec![0]);
    assert!(counts.valid);
}
