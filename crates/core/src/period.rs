// crates/core/src/period.rs
//! Lazily built period tree (month → week → day → hour).
//!
//! A [`TimePeriod`] is cheap to construct: children are only materialized the first
//! time [`TimePeriod::children`] is called, and aggregate metrics the first time
//! [`TimePeriod::metrics`] is called. Both are memoized per node and never
//! recomputed. A node's metrics need its children's own samples but not the
//! grandchildren, so asking a month for its peak builds five or six week nodes and
//! nothing below them.

use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Duration, Months, Utc};
use serde::Serialize;

use crate::config::PeriodConfig;
use crate::error::PeriodError;
use crate::granularity::Granularity;
use crate::sample::{RawSample, SampleSource};

/// Aggregate statistics of one period.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodMetrics {
    pub timestamp: DateTime<Utc>,
    /// Own raw revenue at the anchor instant.
    pub revenue: f64,
    pub customers: u64,
    pub conversions: u64,
    /// Raw revenue exactly `baseline_days` before the anchor.
    pub baseline: f64,
    /// Own revenue times `capacity_buffer`.
    pub capacity: f64,
    /// Highest child revenue, 0 without children.
    pub peak: f64,
    /// Mean child revenue. `None` for leaf periods (no children to average).
    pub average: Option<f64>,
}

/// A revenue value compared against an earlier reference value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueDelta {
    pub current: f64,
    pub previous: f64,
    pub delta: f64,
    /// Percentage change, rounded to 1 decimal place.
    /// None if previous == 0 (cannot calculate percentage).
    pub delta_percent: Option<f64>,
}

impl RevenueDelta {
    pub fn new(current: f64, previous: f64) -> Self {
        let delta = current - previous;
        let delta_percent = if previous == 0.0 {
            None
        } else {
            let percent = (delta / previous) * 100.0;
            Some((percent * 10.0).round() / 10.0)
        };
        Self {
            current,
            previous,
            delta,
            delta_percent,
        }
    }
}

/// Period-over-period and year-over-year revenue comparisons.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodComparisons {
    pub previous_period: RevenueDelta,
    pub yearly: RevenueDelta,
}

/// One bucket of the period hierarchy.
pub struct TimePeriod {
    granularity: Granularity,
    timestamp: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    config: PeriodConfig,
    source: Arc<dyn SampleSource>,
    sample: OnceLock<RawSample>,
    children: OnceLock<Vec<TimePeriod>>,
    metrics: OnceLock<PeriodMetrics>,
}

impl TimePeriod {
    /// Create a period anchored at `timestamp`. Nothing is read from `source` yet.
    pub fn new(
        granularity: Granularity,
        timestamp: DateTime<Utc>,
        source: Arc<dyn SampleSource>,
        config: PeriodConfig,
    ) -> Self {
        let (start, end) = granularity.bounds(timestamp);
        Self {
            granularity,
            timestamp,
            start,
            end,
            config,
            source,
            sample: OnceLock::new(),
            children: OnceLock::new(),
            metrics: OnceLock::new(),
        }
    }

    /// Like [`TimePeriod::new`] but takes the granularity by name.
    pub fn parse(
        kind: &str,
        timestamp: DateTime<Utc>,
        source: Arc<dyn SampleSource>,
        config: PeriodConfig,
    ) -> Result<Self, PeriodError> {
        let granularity = kind.parse::<Granularity>()?;
        Ok(Self::new(granularity, timestamp, source, config))
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// The anchor instant this period was requested with.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn config(&self) -> &PeriodConfig {
        &self.config
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Raw sample at the anchor, zero-filled when the source has none.
    pub fn sample(&self) -> &RawSample {
        self.sample.get_or_init(|| self.lookup(self.timestamp))
    }

    /// Child periods, built on first access.
    pub fn children(&self) -> &[TimePeriod] {
        self.children.get_or_init(|| self.build_children())
    }

    /// Whether [`TimePeriod::children`] has already materialized the child list.
    pub fn children_built(&self) -> bool {
        self.children.get().is_some()
    }

    /// Aggregate metrics, computed on first access.
    pub fn metrics(&self) -> &PeriodMetrics {
        self.metrics.get_or_init(|| self.compute_metrics())
    }

    /// Compare the anchor's revenue with one period earlier and one year earlier.
    pub fn comparisons(&self) -> PeriodComparisons {
        let current = self.sample().revenue;
        let previous = self
            .granularity
            .previous_anchor(self.timestamp)
            .map_or(0.0, |ts| self.revenue_at(ts));
        let last_year = self
            .timestamp
            .checked_sub_months(Months::new(12))
            .map_or(0.0, |ts| self.revenue_at(ts));

        PeriodComparisons {
            previous_period: RevenueDelta::new(current, previous),
            yearly: RevenueDelta::new(current, last_year),
        }
    }

    fn lookup(&self, instant: DateTime<Utc>) -> RawSample {
        self.source
            .get(instant)
            .unwrap_or_else(|| RawSample::zeroed(instant))
    }

    fn revenue_at(&self, instant: DateTime<Utc>) -> f64 {
        self.source.get(instant).map_or(0.0, |s| s.revenue)
    }

    fn build_children(&self) -> Vec<TimePeriod> {
        let Some(child) = self.granularity.child() else {
            return Vec::new();
        };
        tracing::debug!(
            granularity = %self.granularity,
            start = %self.start,
            "Building child periods"
        );
        self.granularity
            .child_anchors(self.start, self.end)
            .into_iter()
            .map(|anchor| TimePeriod::new(child, anchor, Arc::clone(&self.source), self.config))
            .collect()
    }

    fn compute_metrics(&self) -> PeriodMetrics {
        let raw = self.sample().clone();
        let child_revenues: Vec<f64> = self
            .children()
            .iter()
            .map(|child| child.sample().revenue)
            .collect();

        let peak = child_revenues.iter().copied().fold(0.0, f64::max);
        let average = if child_revenues.is_empty() {
            None
        } else {
            Some(child_revenues.iter().sum::<f64>() / child_revenues.len() as f64)
        };
        let baseline = self
            .timestamp
            .checked_sub_signed(Duration::days(self.config.baseline_days as i64))
            .map_or(0.0, |ts| self.revenue_at(ts));

        PeriodMetrics {
            timestamp: self.timestamp,
            revenue: raw.revenue,
            customers: raw.customers,
            conversions: raw.conversions,
            baseline,
            capacity: raw.revenue * self.config.capacity_buffer,
            peak,
            average,
        }
    }
}

impl fmt::Debug for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimePeriod")
            .field("granularity", &self.granularity)
            .field("timestamp", &self.timestamp)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("children_built", &self.children_built())
            .field("metrics", &self.metrics.get())
            .finish()
    }
}
