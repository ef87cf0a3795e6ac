// crates/core/src/granularity.rs
//! Calendar granularities and the interval arithmetic behind the period tree.
//!
//! All boundaries are computed in UTC. Weeks start on Sunday.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PeriodError;

/// Bucket size represented by a [`TimePeriod`](crate::TimePeriod).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
    Week,
    Month,
}

impl Granularity {
    pub const ALL: [Granularity; 4] = [
        Granularity::Hour,
        Granularity::Day,
        Granularity::Week,
        Granularity::Month,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
        }
    }

    /// Granularity of the children, `None` for the leaf level.
    pub fn child(&self) -> Option<Granularity> {
        match self {
            Granularity::Month => Some(Granularity::Week),
            Granularity::Week => Some(Granularity::Day),
            Granularity::Day => Some(Granularity::Hour),
            Granularity::Hour => None,
        }
    }

    /// Half-open interval `[start, end)` of the bucket containing `timestamp`.
    pub fn bounds(&self, timestamp: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            Granularity::Hour => {
                let start = start_of_hour(timestamp);
                (start, start + Duration::hours(1))
            }
            Granularity::Day => {
                let start = start_of_day(timestamp);
                (start, start + Duration::days(1))
            }
            Granularity::Week => {
                let start = start_of_week(timestamp);
                (start, start + Duration::days(7))
            }
            Granularity::Month => {
                let first = first_of_month(timestamp.date_naive());
                let next = first
                    .checked_add_months(Months::new(1))
                    .unwrap_or(NaiveDate::MAX);
                (midnight(first), midnight(next))
            }
        }
    }

    /// Anchor instants of the child buckets inside `[start, end)`.
    ///
    /// Months yield every Sunday week-start whose week overlaps the month, so the
    /// first anchor may precede `start`.
    pub fn child_anchors(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        match self {
            Granularity::Hour => Vec::new(),
            Granularity::Day => (0..24).map(|h| start + Duration::hours(h)).collect(),
            Granularity::Week => (0..7).map(|d| start + Duration::days(d)).collect(),
            Granularity::Month => {
                let mut anchors = Vec::with_capacity(6);
                let mut week = start_of_week(start);
                while week < end {
                    anchors.push(week);
                    week += Duration::days(7);
                }
                anchors
            }
        }
    }

    /// The anchor one bucket earlier, used for period-over-period comparisons.
    pub fn previous_anchor(&self, timestamp: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Granularity::Hour => timestamp.checked_sub_signed(Duration::hours(1)),
            Granularity::Day => timestamp.checked_sub_signed(Duration::days(1)),
            Granularity::Week => timestamp.checked_sub_signed(Duration::days(7)),
            Granularity::Month => timestamp.checked_sub_months(Months::new(1)),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" => Ok(Granularity::Hour),
            "day" => Ok(Granularity::Day),
            "week" => Ok(Granularity::Week),
            "month" => Ok(Granularity::Month),
            _ => Err(PeriodError::invalid_granularity(s)),
        }
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.day0() as i64)
}

/// Midnight UTC of the day containing `timestamp`.
pub fn start_of_day(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    midnight(timestamp.date_naive())
}

/// Top of the hour containing `timestamp`.
pub fn start_of_hour(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(timestamp) + Duration::hours(timestamp.hour() as i64)
}

/// Sunday midnight of the week containing `timestamp`.
pub fn start_of_week(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    let days_since_sunday = timestamp.weekday().num_days_from_sunday() as i64;
    start_of_day(timestamp) - Duration::days(days_since_sunday)
}
