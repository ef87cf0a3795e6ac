// crates/store/src/lib.rs
pub mod cache;
pub mod error;
pub mod fetch;
pub mod store;

pub use cache::{PeriodCache, PeriodKey, RawSampleCache};
pub use error::LoadError;
pub use fetch::{iso_millis, HttpTimeseriesFetcher, TimeseriesFetcher, TimeseriesRecord};
pub use store::{LoadSummary, MetricStore};
