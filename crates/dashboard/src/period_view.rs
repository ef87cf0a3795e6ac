// crates/dashboard/src/period_view.rs
//! Single-period view backing the revenue card: loads a buffered range around the
//! requested bounds, then hands out the cached period tree for `start`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use servelytics_core::{Granularity, TimePeriod};
use servelytics_store::{iso_millis, MetricStore};
use tokio::sync::broadcast;

use crate::state::{Lifecycle, LoadStatus, SettingsSlot, StateCell};
use crate::time_blocks::shift_days;

/// Days loaded on each side of `[start, end]`.
const LOAD_BUFFER_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodViewSettings {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub granularity: Granularity,
}

#[derive(Debug, Clone)]
pub struct PeriodViewState {
    pub status: LoadStatus,
    pub period: Option<Arc<TimePeriod>>,
    pub error: Option<String>,
}

impl PeriodViewState {
    pub fn idle() -> Self {
        Self {
            status: LoadStatus::Idle,
            period: None,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: LoadStatus::Error,
            period: None,
            error: Some(message.into()),
        }
    }
}

impl Default for PeriodViewState {
    fn default() -> Self {
        Self::idle()
    }
}

impl Lifecycle for PeriodViewState {
    fn set_status(&mut self, status: LoadStatus) {
        self.status = status;
    }
}

pub struct PeriodView {
    store: Arc<MetricStore>,
    state: StateCell<PeriodViewState>,
    settings: SettingsSlot<PeriodViewSettings>,
}

impl PeriodView {
    pub fn new(store: Arc<MetricStore>) -> Self {
        Self {
            store,
            state: StateCell::new(PeriodViewState::idle()),
            settings: SettingsSlot::new(),
        }
    }

    /// Apply new bounds. Missing bounds leave the state untouched.
    pub async fn update(&self, settings: &PeriodViewSettings) -> PeriodViewState {
        let (Some(start), Some(end)) = (settings.start, settings.end) else {
            tracing::warn!(
                start = ?settings.start.map(iso_millis),
                end = ?settings.end.map(iso_millis),
                "Invalid period bounds, keeping current view"
            );
            return self.state.snapshot();
        };
        if !self.settings.accept(settings) {
            return self.state.snapshot();
        }
        self.reload(settings.granularity, start, end).await
    }

    /// Reload the last accepted bounds.
    pub async fn retry(&self) -> PeriodViewState {
        let current = self.settings.current();
        match current.as_ref().and_then(|s| Some((s.granularity, s.start?, s.end?))) {
            Some((granularity, start, end)) => self.reload(granularity, start, end).await,
            None => self.state.snapshot(),
        }
    }

    pub fn snapshot(&self) -> PeriodViewState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeriodViewState> {
        self.state.subscribe()
    }

    async fn reload(
        &self,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PeriodViewState {
        let generation = self.state.next_generation();
        self.state.mark_loading(generation);

        let (Some(load_start), Some(load_end)) = (
            shift_days(start, -LOAD_BUFFER_DAYS),
            shift_days(end, LOAD_BUFFER_DAYS),
        ) else {
            let failed = PeriodViewState::failed("Period load range out of bounds");
            self.state.publish(generation, failed);
            return self.state.snapshot();
        };
        if let Err(e) = self.store.load_range(load_start, load_end).await {
            tracing::error!(
                start = %iso_millis(start),
                end = %iso_millis(end),
                error = %e,
                "Metric data load failure"
            );
            self.state.publish(generation, PeriodViewState::failed(e.to_string()));
            return self.state.snapshot();
        }

        let period = self.store.get_period(granularity, start);
        self.state.publish(
            generation,
            PeriodViewState {
                status: LoadStatus::Success,
                period: Some(period),
                error: None,
            },
        );
        self.state.snapshot()
    }
}
