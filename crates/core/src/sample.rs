// crates/core/src/sample.rs
//! Raw hourly samples and the accessor capability periods read them through.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One hour of ground-truth metrics as fetched from the analytics backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSample {
    pub revenue: f64,
    pub customers: u64,
    pub conversions: u64,
    pub timestamp: DateTime<Utc>,
}

impl RawSample {
    /// Zero-valued sample used wherever an hour has no recorded data.
    pub fn zeroed(timestamp: DateTime<Utc>) -> Self {
        Self {
            revenue: 0.0,
            customers: 0,
            conversions: 0,
            timestamp,
        }
    }
}

/// Read access to raw samples by instant.
///
/// Implementations must not panic; returning `None` makes the caller fall back to
/// [`RawSample::zeroed`].
pub trait SampleSource: Send + Sync {
    fn get(&self, timestamp: DateTime<Utc>) -> Option<RawSample>;
}

impl SampleSource for HashMap<DateTime<Utc>, RawSample> {
    fn get(&self, timestamp: DateTime<Utc>) -> Option<RawSample> {
        HashMap::get(self, &timestamp).cloned()
    }
}
