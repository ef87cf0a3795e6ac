// crates/dashboard/src/weekly_blocks.rs
//! Weekly customer totals restricted to an hour-of-day window.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use servelytics_core::{start_of_day, start_of_week};
use servelytics_store::MetricStore;
use tokio::sync::broadcast;

use crate::state::{BlockState, SettingsSlot, StateCell};
use crate::time_blocks::{shift_days, shift_hours};

/// Inclusive hour-of-day window summed for every day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourRange {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl HourRange {
    /// Last hour summed each day. An `end_hour` of 0 means through 23.
    pub fn last_hour(&self) -> u32 {
        match self.end_hour {
            0 => 23,
            end => end.min(23),
        }
    }
}

impl Default for HourRange {
    fn default() -> Self {
        Self {
            start_hour: 8,
            end_hour: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklyBlockSettings {
    pub start_date: Option<DateTime<Utc>>,
    /// Number of weeks.
    pub number_of_blocks: u32,
    pub time_range: HourRange,
    /// Extra days loaded before the first and after the last day.
    pub buffer_days: u32,
}

impl WeeklyBlockSettings {
    pub fn new(start_date: Option<DateTime<Utc>>, number_of_blocks: u32) -> Self {
        Self {
            start_date,
            number_of_blocks,
            time_range: HourRange::default(),
            buffer_days: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyBlock {
    /// Sunday midnight.
    pub week_start: DateTime<Utc>,
    /// Following Sunday midnight (exclusive).
    pub week_end: DateTime<Utc>,
    pub days: Vec<DateTime<Utc>>,
    pub daily_clients: Vec<u64>,
    pub total_clients: u64,
}

/// Week definitions for `settings`, without data. Weeks past the representable date
/// range yield no blocks.
pub fn layout_weekly_blocks(settings: &WeeklyBlockSettings) -> Vec<WeeklyBlock> {
    let Some(start_date) = settings.start_date else {
        return Vec::new();
    };
    let aligned = start_of_week(start_date);
    let weeks = i64::from(settings.number_of_blocks);
    let layout = shift_days(aligned, weeks * 7).and_then(|_| {
        (0..weeks)
            .map(|week| shift_days(aligned, week * 7).and_then(empty_week))
            .collect::<Option<Vec<_>>>()
    });
    layout.unwrap_or_else(|| {
        tracing::warn!(?settings, "Weekly block settings out of range");
        Vec::new()
    })
}

fn empty_week(week_start: DateTime<Utc>) -> Option<WeeklyBlock> {
    let days = (0..7)
        .map(|d| shift_days(week_start, d))
        .collect::<Option<Vec<_>>>()?;
    Some(WeeklyBlock {
        week_start,
        week_end: shift_days(week_start, 7)?,
        days,
        daily_clients: Vec::new(),
        total_clients: 0,
    })
}

/// Weekly aggregator over a shared [`MetricStore`].
pub struct WeeklyClientBlocks {
    store: Arc<MetricStore>,
    state: StateCell<BlockState<WeeklyBlock>>,
    settings: SettingsSlot<WeeklyBlockSettings>,
}

impl WeeklyClientBlocks {
    pub fn new(store: Arc<MetricStore>) -> Self {
        Self {
            store,
            state: StateCell::new(BlockState::idle()),
            settings: SettingsSlot::new(),
        }
    }

    /// Apply new settings. Reloads only when they differ from the last accepted ones.
    pub async fn update(&self, settings: &WeeklyBlockSettings) -> BlockState<WeeklyBlock> {
        if !self.settings.accept(settings) {
            tracing::trace!("Weekly block settings unchanged");
            return self.state.snapshot();
        }
        self.reload(settings).await
    }

    /// Reload with the last accepted settings, even if unchanged.
    pub async fn refresh(&self) -> BlockState<WeeklyBlock> {
        match self.settings.current() {
            Some(settings) => self.reload(&settings).await,
            None => self.state.snapshot(),
        }
    }

    pub fn snapshot(&self) -> BlockState<WeeklyBlock> {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BlockState<WeeklyBlock>> {
        self.state.subscribe()
    }

    async fn reload(&self, settings: &WeeklyBlockSettings) -> BlockState<WeeklyBlock> {
        let generation = self.state.next_generation();
        let layout = layout_weekly_blocks(settings);
        let (Some(first), Some(last)) = (
            layout.first().and_then(|w| w.days.first()),
            layout.last().and_then(|w| w.days.last()),
        ) else {
            self.state.publish(generation, BlockState::success(Vec::new()));
            return self.state.snapshot();
        };

        let buffer = i64::from(settings.buffer_days);
        let range = settings.time_range;
        let load_start = shift_days(*first, -buffer)
            .and_then(|day| shift_hours(start_of_day(day), i64::from(range.start_hour)));
        let load_end = shift_days(*last, buffer)
            .and_then(|day| shift_hours(start_of_day(day), i64::from(range.last_hour())));
        let (Some(load_start), Some(load_end)) = (load_start, load_end) else {
            let failed = BlockState::failed("Weekly load range out of bounds");
            self.state.publish(generation, failed);
            return self.state.snapshot();
        };

        self.state.mark_loading(generation);
        if let Err(e) = self.store.load_range(load_start, load_end).await {
            self.state.publish(generation, BlockState::failed(e.to_string()));
            return self.state.snapshot();
        }

        let blocks = self.hydrate(layout, range);
        self.state.publish(generation, BlockState::success(blocks));
        self.state.snapshot()
    }

    fn hydrate(&self, mut blocks: Vec<WeeklyBlock>, range: HourRange) -> Vec<WeeklyBlock> {
        let raw = self.store.raw();
        let last_hour = range.last_hour();
        for block in &mut blocks {
            block.daily_clients = block
                .days
                .iter()
                .map(|day| {
                    (range.start_hour..=last_hour)
                        .filter_map(|h| shift_hours(*day, i64::from(h)))
                        .filter_map(|hour| raw.get(hour))
                        .map(|sample| sample.customers)
                        .sum()
                })
                .collect();
            block.total_clients = block.daily_clients.iter().sum();
        }
        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn day(m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_weeks_align_to_sunday() {
        // 2024-01-03 is a Wednesday.
        let settings = WeeklyBlockSettings::new(Some(day(1, 3) + Duration::hours(15)), 2);
        let blocks = layout_weekly_blocks(&settings);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].week_start, Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap());
        assert_eq!(blocks[0].week_end, day(1, 7));
        assert_eq!(blocks[0].days.len(), 7);
        assert_eq!(blocks[1].week_start, day(1, 7));
        assert_eq!(blocks[1].days[6], day(1, 13));
    }

    #[test]
    fn test_absent_start_or_zero_weeks_is_empty() {
        assert!(layout_weekly_blocks(&WeeklyBlockSettings::new(None, 4)).is_empty());
        assert!(layout_weekly_blocks(&WeeklyBlockSettings::new(Some(day(1, 3)), 0)).is_empty());
    }

    #[test]
    fn test_default_time_range() {
        let settings = WeeklyBlockSettings::new(None, 1);
        assert_eq!(settings.time_range, HourRange { start_hour: 8, end_hour: 16 });
        assert_eq!(settings.buffer_days, 0);
    }

    #[test]
    fn test_zero_end_hour_sums_through_end_of_day() {
        let range = HourRange {
            start_hour: 8,
            end_hour: 0,
        };
        assert_eq!(range.last_hour(), 23);
        assert_eq!(HourRange::default().last_hour(), 16);
        let late = HourRange {
            start_hour: 20,
            end_hour: 30,
        };
        assert_eq!(late.last_hour(), 23);
    }

    #[test]
    fn test_out_of_range_settings_do_not_panic() {
        let mut settings = WeeklyBlockSettings::new(Some(day(1, 3)), u32::MAX);
        assert!(layout_weekly_blocks(&settings).is_empty());

        settings.number_of_blocks = 1;
        settings.start_date = Some(DateTime::<Utc>::MAX_UTC);
        assert!(layout_weekly_blocks(&settings).is_empty());
    }
}
