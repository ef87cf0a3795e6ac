// crates/store/src/cache.rs
//! In-memory caches owned by the metric store.
//!
//! Both caches are last-write-wins maps behind a `std::sync::RwLock`. Locks are
//! never held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use servelytics_core::{Granularity, RawSample, SampleSource, TimePeriod};

fn read_lock<'a, T>(lock: &'a RwLock<T>, what: &str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|e| {
        tracing::error!("RwLock poisoned reading {what}: {e}");
        e.into_inner()
    })
}

fn write_lock<'a, T>(lock: &'a RwLock<T>, what: &str) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|e| {
        tracing::error!("RwLock poisoned writing {what}: {e}");
        e.into_inner()
    })
}

/// Raw hourly samples keyed by their own timestamp.
///
/// Grows monotonically for the lifetime of the store; a later load overwrites
/// samples with the same timestamp.
#[derive(Debug, Default)]
pub struct RawSampleCache {
    samples: RwLock<HashMap<DateTime<Utc>, RawSample>>,
}

impl RawSampleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact lookup, no fallback.
    pub fn get(&self, timestamp: DateTime<Utc>) -> Option<RawSample> {
        read_lock(&self.samples, "raw samples").get(&timestamp).cloned()
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        read_lock(&self.samples, "raw samples").contains_key(&timestamp)
    }

    /// Store every sample, replacing existing entries. Returns how many were written.
    pub fn insert_many(&self, samples: impl IntoIterator<Item = RawSample>) -> usize {
        let mut guard = write_lock(&self.samples, "raw samples");
        let mut written = 0;
        for sample in samples {
            guard.insert(sample.timestamp, sample);
            written += 1;
        }
        written
    }

    pub fn len(&self) -> usize {
        read_lock(&self.samples, "raw samples").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All samples ordered by timestamp.
    pub fn entries(&self) -> Vec<RawSample> {
        let mut entries: Vec<RawSample> =
            read_lock(&self.samples, "raw samples").values().cloned().collect();
        entries.sort_by_key(|s| s.timestamp);
        entries
    }
}

/// Accessor handed to period trees: the cached sample or a zeroed fallback.
impl SampleSource for RawSampleCache {
    fn get(&self, timestamp: DateTime<Utc>) -> Option<RawSample> {
        Some(RawSampleCache::get(self, timestamp).unwrap_or_else(|| RawSample::zeroed(timestamp)))
    }
}

/// Cache key for a period: granularity plus the anchor truncated to milliseconds,
/// so anchors that format to the same ISO-8601 string share an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeriodKey {
    pub granularity: Granularity,
    pub timestamp_millis: i64,
}

impl PeriodKey {
    pub fn new(granularity: Granularity, timestamp: DateTime<Utc>) -> Self {
        Self {
            granularity,
            timestamp_millis: timestamp.timestamp_millis(),
        }
    }
}

/// Memoized period trees.
#[derive(Debug, Default)]
pub struct PeriodCache {
    periods: RwLock<HashMap<PeriodKey, Arc<TimePeriod>>>,
}

impl PeriodCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PeriodKey) -> Option<Arc<TimePeriod>> {
        read_lock(&self.periods, "period cache").get(key).cloned()
    }

    /// Return the cached period for `key`, building and caching it on a miss.
    pub fn get_or_insert_with(
        &self,
        key: PeriodKey,
        build: impl FnOnce() -> TimePeriod,
    ) -> Arc<TimePeriod> {
        if let Some(hit) = self.get(&key) {
            return hit;
        }
        let mut guard = write_lock(&self.periods, "period cache");
        // Another caller may have inserted between the read and the write lock.
        Arc::clone(guard.entry(key).or_insert_with(|| Arc::new(build())))
    }

    /// Drop every cached period. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut guard = write_lock(&self.periods, "period cache");
        let removed = guard.len();
        guard.clear();
        removed
    }

    pub fn len(&self) -> usize {
        read_lock(&self.periods, "period cache").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
