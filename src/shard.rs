//! Lock-striped shard holding a subset of tracked series
//!
//! The tracker splits series across 512 shards by fingerprint. Each shard
//! owns its own reader-writer lock, its map of fingerprint → entry chain,
//! and cached active counts, so writers hashing to different shards never
//! contend. The warmed hot path (advancing the timestamp of a known series)
//! takes only the shard read-lock; the write-lock is taken on first
//! observation of a series and during purge.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::labels::LabelSet;
use crate::matchers::Matchers;

/// Record for one distinct tracked series
///
/// The timestamp lives in a heap-allocated atomic cell: lookups hand a clone
/// of the `Arc` to the caller, which then advances the timestamp without any
/// lock held. A chain `Vec` reallocation cannot invalidate it.
struct Entry {
    labels: LabelSet,
    nanos: Arc<AtomicI64>,
    /// Which configured matcher each entry satisfies, aligned with the
    /// shard's `active_matching`. Immutable for the entry's lifetime.
    matches: Vec<bool>,
}

/// State guarded by the shard lock
struct ShardInner {
    matchers: Arc<Matchers>,
    /// Fingerprint → entries. A chain longer than one means fingerprint
    /// collision; entries within a chain have distinct label sets.
    refs: HashMap<u64, Vec<Entry>>,
    /// Cached count of entries. Only decreased by purge or clear.
    active: usize,
    /// Cached per-matcher counts, aligned with `matchers.matcher_names()`.
    active_matching: Vec<usize>,
}

/// One of the tracker's fixed stripes
pub(crate) struct Shard {
    /// Unix nanoseconds of the oldest entry, or 0 for "unknown". A purge
    /// with a cutoff at or before this value cannot remove anything and
    /// returns without locking. Conservative: may lag behind the true
    /// minimum, never run ahead of it. Updated without the lock held,
    /// hence the atomic.
    oldest_entry_ts: AtomicI64,
    inner: RwLock<ShardInner>,
}

impl Shard {
    pub(crate) fn new(matchers: Arc<Matchers>) -> Self {
        let tracker_count = matchers.matcher_names().len();
        Self {
            oldest_entry_ts: AtomicI64::new(0),
            inner: RwLock::new(ShardInner {
                matchers,
                refs: HashMap::new(),
                active: 0,
                active_matching: resize_and_zero(tracker_count, Vec::new()),
            }),
        }
    }

    /// Record that `series` was observed at `now_nanos`
    ///
    /// Fast path: find the entry under the read-lock and advance its
    /// timestamp with a CAS. The CAS is not retried: if it fails, a
    /// concurrent writer installed a timestamp at least as useful.
    pub(crate) fn update_series_timestamp<F>(
        &self,
        now_nanos: i64,
        series: &LabelSet,
        fingerprint: u64,
        labels_copy: F,
    ) where
        F: FnOnce(&LabelSet) -> LabelSet,
    {
        let mut entry_time_set = false;
        let nanos = match self.find_entry(fingerprint, series) {
            Some(nanos) => nanos,
            None => {
                let (nanos, created) =
                    self.find_or_create_entry(fingerprint, series, now_nanos, labels_copy);
                entry_time_set = created;
                nanos
            }
        };

        if !entry_time_set {
            let prev = nanos.load(Ordering::Acquire);
            if now_nanos > prev {
                entry_time_set = nanos
                    .compare_exchange(prev, now_nanos, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok();
            }
        }

        if entry_time_set {
            // The hint may have been computed assuming this entry was older.
            // Invalidate it so the next purge takes the full scan; purge
            // re-establishes it.
            loop {
                let prev_oldest = self.oldest_entry_ts.load(Ordering::Acquire);
                if now_nanos >= prev_oldest {
                    break;
                }
                if self
                    .oldest_entry_ts
                    .compare_exchange(prev_oldest, 0, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    break;
                }
            }
        }
    }

    /// Look up the series under the read-lock
    fn find_entry(&self, fingerprint: u64, series: &LabelSet) -> Option<Arc<AtomicI64>> {
        let inner = self.inner.read();
        inner
            .refs
            .get(&fingerprint)?
            .iter()
            .find(|entry| entry.labels == *series)
            .map(|entry| Arc::clone(&entry.nanos))
    }

    /// Insert the series under the write-lock, re-checking for a concurrent
    /// insert first. Returns the timestamp cell and whether this call
    /// created the entry (and therefore already set its timestamp).
    fn find_or_create_entry<F>(
        &self,
        fingerprint: u64,
        series: &LabelSet,
        now_nanos: i64,
        labels_copy: F,
    ) -> (Arc<AtomicI64>, bool)
    where
        F: FnOnce(&LabelSet) -> LabelSet,
    {
        let mut inner = self.inner.write();

        // Repeats find_entry, but under the write lock: another writer may
        // have inserted between our read unlock and write lock.
        if let Some(entry) = inner
            .refs
            .get(&fingerprint)
            .and_then(|chain| chain.iter().find(|entry| entry.labels == *series))
        {
            return (Arc::clone(&entry.nanos), false);
        }

        let matches = inner.matchers.matches(series);

        inner.active += 1;
        for (count, matched) in inner.active_matching.iter_mut().zip(&matches) {
            if *matched {
                *count += 1;
            }
        }

        let nanos = Arc::new(AtomicI64::new(now_nanos));
        inner.refs.entry(fingerprint).or_default().push(Entry {
            labels: labels_copy(series),
            nanos: Arc::clone(&nanos),
            matches,
        });

        (nanos, true)
    }

    /// Remove entries last observed strictly before `keep_until_nanos` and
    /// rebuild the cached counters
    ///
    /// Returns whether the slow path ran; `false` means the oldest-entry
    /// hint proved nothing could have expired and no lock was taken.
    pub(crate) fn purge(&self, keep_until_nanos: i64) -> bool {
        let oldest = self.oldest_entry_ts.load(Ordering::Acquire);
        if oldest > 0 && keep_until_nanos <= oldest {
            // Nothing can be expired.
            return false;
        }

        let mut inner = self.inner.write();

        let tracker_count = inner.matchers.matcher_names().len();
        let mut active = 0usize;
        let mut active_matching =
            resize_and_zero(tracker_count, std::mem::take(&mut inner.active_matching));
        let mut new_oldest = i64::MAX;

        inner.refs.retain(|_, entries| {
            // Fingerprint collisions are rare, so the single-entry chain
            // gets the direct implementation.
            if entries.len() == 1 {
                let ts = entries[0].nanos.load(Ordering::Acquire);
                if ts < keep_until_nanos {
                    return false;
                }
                active += 1;
                for (count, matched) in active_matching.iter_mut().zip(&entries[0].matches) {
                    if *matched {
                        *count += 1;
                    }
                }
                if ts < new_oldest {
                    new_oldest = ts;
                }
                return true;
            }

            // Collision chain: filter in place, then recount survivors.
            entries.retain(|entry| {
                let ts = entry.nanos.load(Ordering::Acquire);
                if ts < keep_until_nanos {
                    return false;
                }
                if ts < new_oldest {
                    new_oldest = ts;
                }
                true
            });
            if entries.is_empty() {
                return false;
            }
            active += entries.len();
            for entry in entries.iter() {
                for (count, matched) in active_matching.iter_mut().zip(&entry.matches) {
                    if *matched {
                        *count += 1;
                    }
                }
            }
            true
        });

        self.oldest_entry_ts.store(
            if new_oldest == i64::MAX { 0 } else { new_oldest },
            Ordering::Release,
        );
        inner.active = active;
        inner.active_matching = active_matching;
        true
    }

    /// Add this shard's per-matcher counts into `matching` and return the
    /// shard's active total
    ///
    /// Reader-safe with concurrent updates; the result reflects the most
    /// recent purge plus inserts since.
    pub(crate) fn total_and_accumulate(&self, matching: &mut [usize]) -> usize {
        let inner = self.inner.read();
        // matching.len() == inner.active_matching.len(): both sized from the
        // current matcher set, and reload replaces them together.
        for (total, count) in matching.iter_mut().zip(&inner.active_matching) {
            *total += *count;
        }
        inner.active
    }

    /// Drop all entries and adopt a new matcher set, resizing the
    /// per-matcher counters to match
    pub(crate) fn reinitialize(&self, matchers: Arc<Matchers>) {
        let mut inner = self.inner.write();
        self.oldest_entry_ts.store(0, Ordering::Release);
        inner.refs = HashMap::new();
        inner.active = 0;
        let tracker_count = matchers.matcher_names().len();
        inner.active_matching =
            resize_and_zero(tracker_count, std::mem::take(&mut inner.active_matching));
        inner.matchers = matchers;
    }

    /// Drop all entries, keeping the current matcher set
    pub(crate) fn clear(&self) {
        let mut inner = self.inner.write();
        self.oldest_entry_ts.store(0, Ordering::Release);
        inner.refs = HashMap::new();
        inner.active = 0;
        for count in inner.active_matching.iter_mut() {
            *count = 0;
        }
    }

    #[cfg(test)]
    fn chain_len(&self, fingerprint: u64) -> usize {
        self.inner
            .read()
            .refs
            .get(&fingerprint)
            .map_or(0, Vec::len)
    }

    #[cfg(test)]
    fn counts(&self) -> (usize, Vec<usize>) {
        let inner = self.inner.read();
        (inner.active, inner.active_matching.clone())
    }

    #[cfg(test)]
    fn oldest_hint(&self) -> i64 {
        self.oldest_entry_ts.load(Ordering::Acquire)
    }
}

/// Resize an integer counter buffer to `len`, zeroed, reusing the previous
/// allocation when its capacity suffices
///
/// A fresh allocation reserves twice the needed capacity so that a matcher
/// set growing by a few entries does not reallocate on every reload.
pub(crate) fn resize_and_zero(len: usize, mut prev: Vec<usize>) -> Vec<usize> {
    if prev.capacity() < len {
        if len == 0 {
            return Vec::new();
        }
        let mut fresh = Vec::with_capacity(len * 2);
        fresh.resize(len, 0);
        return fresh;
    }
    prev.clear();
    prev.resize(len, 0);
    prev
}
