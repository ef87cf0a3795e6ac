// crates/dashboard/src/time_blocks.rs
//! Customer counts per hour-of-day block (heatmap rows).
//!
//! Each day from `start_day` is cut into blocks of `block_duration` hours beginning at
//! `block_start_hour`. Every block sums the `customers` of the hourly samples it
//! covers; hours the backend never returned count as zero and are reported once as a
//! partial-data warning.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use servelytics_core::start_of_day;
use servelytics_store::{iso_millis, MetricStore};
use tokio::sync::broadcast;

use crate::state::{BlockState, SettingsSlot, StateCell};

/// Extra data loaded on each side of the visible blocks.
const LOAD_BUFFER_DAYS: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeBlockSettings {
    pub start_day: Option<DateTime<Utc>>,
    pub block_start_hour: u32,
    /// Block length in hours.
    pub block_duration: u32,
    pub number_of_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBlock {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Hour instants in `[start, end]`.
    pub hours: Vec<DateTime<Utc>>,
    pub customers: u64,
    /// Hours with no sample in the raw cache.
    pub missing_hours: u32,
}

impl TimeBlock {
    /// Block covering the closed hour range `[start, start + duration]`.
    fn spanning(start: DateTime<Utc>, duration: u32) -> Option<Self> {
        let end = shift_hours(start, i64::from(duration))?;
        let hours = (0..=i64::from(duration))
            .map(|h| shift_hours(start, h))
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            start,
            end,
            hours,
            customers: 0,
            missing_hours: 0,
        })
    }
}

pub(crate) fn shift_hours(instant: DateTime<Utc>, hours: i64) -> Option<DateTime<Utc>> {
    instant.checked_add_signed(Duration::try_hours(hours)?)
}

pub(crate) fn shift_days(instant: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    instant.checked_add_signed(Duration::try_days(days)?)
}

/// Block definitions for `settings`, without data.
///
/// Blocks start at `day + block_start_hour` and advance by `block_duration` while
/// the start lies within `[day, next midnight]`, so the last block may run past
/// midnight. Settings that leave the representable date range yield no blocks.
pub fn layout_time_blocks(settings: &TimeBlockSettings) -> Vec<TimeBlock> {
    let Some(start_day) = settings.start_day else {
        return Vec::new();
    };
    if settings.block_duration == 0 {
        return Vec::new();
    }
    layout_from(start_of_day(start_day), settings).unwrap_or_else(|| {
        tracing::warn!(?settings, "Time block settings out of range");
        Vec::new()
    })
}

fn layout_from(
    first_day: DateTime<Utc>,
    settings: &TimeBlockSettings,
) -> Option<Vec<TimeBlock>> {
    let days = i64::from(settings.number_of_days);
    // The whole range must be representable.
    shift_days(first_day, days)?;

    let mut blocks = Vec::new();
    for offset in 0..days {
        let day = shift_days(first_day, offset)?;
        let day_end = shift_days(day, 1)?;
        let mut block_start = shift_hours(day, i64::from(settings.block_start_hour))?;
        while block_start <= day_end {
            let block = TimeBlock::spanning(block_start, settings.block_duration)?;
            block_start = block.end;
            blocks.push(block);
        }
    }
    Some(blocks)
}

/// Hour-block aggregator over a shared [`MetricStore`].
pub struct CustomerTimeBlocks {
    store: Arc<MetricStore>,
    state: StateCell<BlockState<TimeBlock>>,
    settings: SettingsSlot<TimeBlockSettings>,
}

impl CustomerTimeBlocks {
    pub fn new(store: Arc<MetricStore>) -> Self {
        Self {
            store,
            state: StateCell::new(BlockState::idle()),
            settings: SettingsSlot::new(),
        }
    }

    /// Apply new settings. Reloads only when they differ from the last accepted ones.
    pub async fn update(&self, settings: &TimeBlockSettings) -> BlockState<TimeBlock> {
        if !self.settings.accept(settings) {
            tracing::trace!("Time block settings unchanged");
            return self.state.snapshot();
        }
        self.reload(settings).await
    }

    /// Reload with the last accepted settings, even if unchanged.
    pub async fn retry(&self) -> BlockState<TimeBlock> {
        match self.settings.current() {
            Some(settings) => self.reload(&settings).await,
            None => self.state.snapshot(),
        }
    }

    pub fn snapshot(&self) -> BlockState<TimeBlock> {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BlockState<TimeBlock>> {
        self.state.subscribe()
    }

    async fn reload(&self, settings: &TimeBlockSettings) -> BlockState<TimeBlock> {
        let generation = self.state.next_generation();
        let layout = layout_time_blocks(settings);
        let (Some(first), Some(last)) = (layout.first(), layout.last()) else {
            self.state.publish(generation, BlockState::success(Vec::new()));
            return self.state.snapshot();
        };
        let (Some(load_start), Some(load_end)) = (
            shift_days(first.start, -LOAD_BUFFER_DAYS),
            shift_days(last.end, LOAD_BUFFER_DAYS),
        ) else {
            let failed = BlockState::failed("Time block load range out of bounds");
            self.state.publish(generation, failed);
            return self.state.snapshot();
        };

        self.state.mark_loading(generation);
        if let Err(e) = self.store.load_range(load_start, load_end).await {
            self.state.publish(generation, BlockState::failed(e.to_string()));
            return self.state.snapshot();
        }

        let blocks = self.hydrate(layout);
        self.state.publish(generation, BlockState::success(blocks));
        self.state.snapshot()
    }

    fn hydrate(&self, mut blocks: Vec<TimeBlock>) -> Vec<TimeBlock> {
        let raw = self.store.raw();
        for block in &mut blocks {
            for hour in &block.hours {
                match raw.get(*hour) {
                    Some(sample) => block.customers += sample.customers,
                    None => block.missing_hours += 1,
                }
            }
        }

        let partial: Vec<String> = blocks
            .iter()
            .filter(|b| b.missing_hours > 0)
            .map(|b| iso_millis(b.start))
            .collect();
        if !partial.is_empty() {
            tracing::warn!(
                blocks = partial.len(),
                starts = ?partial,
                "Partial data for time blocks"
            );
        }
        blocks
    }
}
