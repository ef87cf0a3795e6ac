// crates/store/src/fetch.rs
//! Fetching hourly timeseries records from the analytics API.
//!
//! `GET {base_url}/analytics/timeseries/?start=<iso>&end=<iso>&granularity=hour`
//! returns a JSON array of records. Revenue arrives as a numeric string; absent or
//! unparseable fields decode to zero.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer};
use servelytics_core::{ApiConfig, Granularity, RawSample};

use crate::error::LoadError;

/// One record of the timeseries response body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimeseriesRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_revenue: f64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total_customers: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub order_count: u64,
}

impl From<TimeseriesRecord> for RawSample {
    fn from(record: TimeseriesRecord) -> Self {
        RawSample {
            revenue: record.total_revenue,
            customers: record.total_customers,
            conversions: record.order_count,
            timestamp: record.timestamp,
        }
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let parsed = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(parsed.filter(|v| v.is_finite()).unwrap_or(0.0))
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let parsed = match value {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    Ok(parsed.unwrap_or(0))
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn iso_millis(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Source of raw timeseries records for a closed range `[start, end]`.
#[async_trait]
pub trait TimeseriesFetcher: Send + Sync {
    async fn fetch(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<Vec<TimeseriesRecord>, LoadError>;

    /// Fetcher name for logging.
    fn name(&self) -> &str;
}

/// [`TimeseriesFetcher`] backed by the analytics HTTP API.
#[derive(Debug, Clone)]
pub struct HttpTimeseriesFetcher {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpTimeseriesFetcher {
    pub fn new(config: &ApiConfig) -> Result<Self, LoadError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LoadError::Client(e.to_string()))?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: &ApiConfig) -> Self {
        Self {
            client,
            url: config.timeseries_url(),
            token: config.token.clone(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TimeseriesFetcher for HttpTimeseriesFetcher {
    async fn fetch(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<Vec<TimeseriesRecord>, LoadError> {
        let mut request = self.client.get(&self.url).query(&[
            ("start", iso_millis(start)),
            ("end", iso_millis(end)),
            ("granularity", granularity.as_str().to_string()),
        ]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|source| LoadError::Request {
            url: self.url.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|source| LoadError::Request {
            url: self.url.clone(),
            source,
        })?;

        serde_json::from_str::<Vec<TimeseriesRecord>>(&body).map_err(|e| LoadError::Decode {
            url: self.url.clone(),
            message: e.to_string(),
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_record_decoding_is_lenient() {
        let body = r#"[
            {"timestamp": "2024-01-01T08:00:00Z", "total_revenue": "123.45", "total_customers": 10, "order_count": 4},
            {"timestamp": "2024-01-01T09:00:00.000Z", "total_revenue": 80, "total_customers": null},
            {"timestamp": "2024-01-01T10:00:00+00:00", "total_revenue": "n/a"}
        ]"#;
        let records: Vec<TimeseriesRecord> = serde_json::from_str(body).unwrap();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].total_revenue, 123.45);
        assert_eq!(records[0].total_customers, 10);
        assert_eq!(records[0].order_count, 4);

        assert_eq!(records[1].total_revenue, 80.0);
        assert_eq!(records[1].total_customers, 0);
        assert_eq!(records[1].order_count, 0);

        assert_eq!(records[2].total_revenue, 0.0);
        assert_eq!(
            records[2].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_record_into_sample() {
        let record = TimeseriesRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
            total_revenue: 12.5,
            total_customers: 3,
            order_count: 2,
        };
        let sample = RawSample::from(record);
        assert_eq!(sample.revenue, 12.5);
        assert_eq!(sample.customers, 3);
        assert_eq!(sample.conversions, 2);
    }

    #[test]
    fn test_iso_millis() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        assert_eq!(iso_millis(ts), "2024-01-01T08:00:00.000Z");
    }

    #[test]
    fn test_missing_timestamp_is_an_error() {
        let body = r#"[{"total_revenue": "1.0"}]"#;
        assert!(serde_json::from_str::<Vec<TimeseriesRecord>>(body).is_err());
    }
}
