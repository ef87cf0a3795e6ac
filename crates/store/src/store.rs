// crates/store/src/store.rs
//! `MetricStore`: raw sample cache + period cache behind one façade.
//!
//! Many granularity views share one underlying sample set, so a range is fetched
//! once and every period tree reads the same cache.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use servelytics_core::{
    AnalyticsConfig, Granularity, PeriodConfig, RawSample, SampleSource, TimePeriod,
};

use crate::cache::{PeriodCache, PeriodKey, RawSampleCache};
use crate::error::LoadError;
use crate::fetch::{iso_millis, HttpTimeseriesFetcher, TimeseriesFetcher};

/// Outcome of a successful [`MetricStore::load_range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    /// Records returned by the API and written to the raw cache.
    pub records: usize,
    /// Cached periods dropped because new samples arrived.
    pub periods_invalidated: usize,
}

pub struct MetricStore {
    raw: Arc<RawSampleCache>,
    periods: PeriodCache,
    fetcher: Arc<dyn TimeseriesFetcher>,
    period_config: PeriodConfig,
}

impl MetricStore {
    pub fn new(fetcher: Arc<dyn TimeseriesFetcher>, period_config: PeriodConfig) -> Self {
        Self {
            raw: Arc::new(RawSampleCache::new()),
            periods: PeriodCache::new(),
            fetcher,
            period_config,
        }
    }

    /// Store backed by the HTTP API described in `config`.
    pub fn from_config(config: &AnalyticsConfig) -> Result<Self, LoadError> {
        let fetcher = HttpTimeseriesFetcher::new(&config.api)?;
        Ok(Self::new(Arc::new(fetcher), config.periods))
    }

    pub fn raw(&self) -> &RawSampleCache {
        &self.raw
    }

    pub fn periods(&self) -> &PeriodCache {
        &self.periods
    }

    pub fn period_config(&self) -> &PeriodConfig {
        &self.period_config
    }

    /// Fetch hourly samples for `[start, end]` and merge them into the raw cache.
    ///
    /// Callers must pass `start <= end`. One request per call: no retry, no
    /// de-duplication of overlapping in-flight loads. Failures are logged and
    /// returned; the cache is left untouched.
    pub async fn load_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<LoadSummary, LoadError> {
        let started = Instant::now();
        let records = match self.fetcher.fetch(start, end, Granularity::Hour).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(
                    fetcher = self.fetcher.name(),
                    start = %iso_millis(start),
                    end = %iso_millis(end),
                    transient = e.is_transient(),
                    error = %e,
                    "Timeseries range load failed"
                );
                return Err(e);
            }
        };

        let written = self
            .raw
            .insert_many(records.into_iter().map(RawSample::from));
        let periods_invalidated = if written > 0 { self.periods.clear() } else { 0 };

        tracing::debug!(
            fetcher = self.fetcher.name(),
            start = %iso_millis(start),
            end = %iso_millis(end),
            records = written,
            periods_invalidated,
            duration_ms = started.elapsed().as_millis() as u64,
            "Loaded timeseries range"
        );

        Ok(LoadSummary {
            records: written,
            periods_invalidated,
        })
    }

    /// Cached period for `(granularity, timestamp)`, built against the current raw
    /// cache on a miss. A hit returns the same `Arc` without re-validation.
    pub fn get_period(
        &self,
        granularity: Granularity,
        timestamp: DateTime<Utc>,
    ) -> Arc<TimePeriod> {
        let key = PeriodKey::new(granularity, timestamp);
        if let Some(hit) = self.periods.get(&key) {
            tracing::trace!(%granularity, timestamp = %iso_millis(timestamp), "Period cache hit");
            return hit;
        }
        self.periods.get_or_insert_with(key, || {
            tracing::debug!(%granularity, timestamp = %iso_millis(timestamp), "Building period");
            TimePeriod::new(granularity, timestamp, self.source(), self.period_config)
        })
    }

    /// Zeroed sample for hours without data.
    pub fn generate_fallback_data(&self, timestamp: DateTime<Utc>) -> RawSample {
        RawSample::zeroed(timestamp)
    }

    /// The accessor period trees read through: cached sample or zeroed fallback.
    pub fn source(&self) -> Arc<dyn SampleSource> {
        self.raw.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::fetch::TimeseriesRecord;

    struct FixedFetcher {
        records: Vec<TimeseriesRecord>,
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TimeseriesFetcher for FixedFetcher {
        async fn fetch(
            &self,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _granularity: Granularity,
        ) -> Result<Vec<TimeseriesRecord>, LoadError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                return Err(LoadError::Other("backend unavailable".into()));
            }
            Ok(self.records.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap()
    }

    fn record(ts: DateTime<Utc>, revenue: f64, customers: u64) -> TimeseriesRecord {
        TimeseriesRecord {
            timestamp: ts,
            total_revenue: revenue,
            total_customers: customers,
            order_count: customers / 2,
        }
    }

    fn breakfast() -> Vec<TimeseriesRecord> {
        vec![record(at(1, 8), 120.0, 10), record(at(1, 9), 60.0, 5)]
    }

    fn store_with(records: Vec<TimeseriesRecord>, fail: bool) -> (MetricStore, Arc<FixedFetcher>) {
        let fetcher = Arc::new(FixedFetcher {
            records,
            fail,
            calls: AtomicUsize::new(0),
        });
        (MetricStore::new(fetcher.clone(), PeriodConfig::default()), fetcher)
    }

    #[tokio::test]
    async fn test_load_range_populates_raw_cache() {
        let (store, fetcher) = store_with(breakfast(), false);
        let summary = store.load_range(at(1, 0), at(2, 0)).await.unwrap();

        assert_eq!(summary.records, 2);
        assert_eq!(store.raw().len(), 2);
        assert_eq!(store.raw().get(at(1, 8)).map(|s| s.customers), Some(10));
        assert_eq!(fetcher.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_load_range_twice_is_idempotent() {
        let (store, fetcher) = store_with(breakfast(), false);
        store.load_range(at(1, 0), at(2, 0)).await.unwrap();
        let first = store.raw().entries();
        store.load_range(at(1, 0), at(2, 0)).await.unwrap();

        assert_eq!(store.raw().entries(), first);
        assert_eq!(fetcher.calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_load_range_failure_is_returned_not_raised() {
        let (store, _) = store_with(vec![], true);
        let err = store.load_range(at(1, 0), at(2, 0)).await.unwrap_err();
        assert_eq!(err.to_string(), "backend unavailable");
        assert!(store.raw().is_empty());
    }

    #[tokio::test]
    async fn test_empty_response_is_success() {
        let (store, _) = store_with(vec![], false);
        let summary = store.load_range(at(1, 0), at(2, 0)).await.unwrap();
        assert_eq!(summary, LoadSummary { records: 0, periods_invalidated: 0 });
    }

    #[test]
    fn test_get_period_is_memoized_per_millisecond() {
        let (store, _) = store_with(vec![], false);
        let t = at(3, 0);
        let a = store.get_period(Granularity::Day, t);
        let b = store.get_period(Granularity::Day, t);
        let c = store.get_period(Granularity::Day, t + Duration::microseconds(10));
        let d = store.get_period(Granularity::Day, t + Duration::hours(1));

        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &c));
        // Same calendar day, different anchor: a separate entry.
        assert!(!Arc::ptr_eq(&a, &d));
        assert!(!Arc::ptr_eq(&a, &store.get_period(Granularity::Week, t)));
    }

    #[tokio::test]
    async fn test_load_with_records_invalidates_periods() {
        let (store, _) = store_with(vec![record(at(1, 8), 120.0, 10)], false);
        let before = store.get_period(Granularity::Day, at(1, 0));
        assert_eq!(before.metrics().peak, 0.0);

        let summary = store.load_range(at(1, 0), at(2, 0)).await.unwrap();
        assert_eq!(summary.periods_invalidated, 1);

        let after = store.get_period(Granularity::Day, at(1, 0));
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.metrics().peak, 120.0);
    }

    #[test]
    fn test_fallback_data_is_zeroed() {
        let (store, _) = store_with(vec![], false);
        let fallback = store.generate_fallback_data(at(4, 5));
        assert_eq!(fallback, RawSample::zeroed(at(4, 5)));
        assert_eq!(store.source().get(at(4, 5)), Some(fallback));
    }
}
