// crates/dashboard/src/lib.rs
//! Dashboard aggregators over a shared [`MetricStore`](servelytics_store::MetricStore).
pub mod period_view;
pub mod state;
pub mod time_blocks;
pub mod weekly_blocks;

pub use period_view::{PeriodView, PeriodViewSettings, PeriodViewState};
pub use state::{BlockState, Lifecycle, LoadStatus, SettingsSlot, StateCell};
pub use time_blocks::{layout_time_blocks, CustomerTimeBlocks, TimeBlock, TimeBlockSettings};
pub use weekly_blocks::{
    layout_weekly_blocks, HourRange, WeeklyBlock, WeeklyBlockSettings, WeeklyClientBlocks,
};
