//! Integration tests for loading ranges through the HTTP timeseries API.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use mockito::Matcher;
use servelytics_core::{ApiConfig, Granularity, PeriodConfig};
use servelytics_store::{HttpTimeseriesFetcher, LoadError, MetricStore};

const BODY: &str = r#"[
    {"timestamp": "2024-01-01T08:00:00.000Z", "total_revenue": "250.50", "total_customers": 10, "order_count": 7},
    {"timestamp": "2024-01-01T09:00:00.000Z", "total_revenue": "99.50", "total_customers": 5, "order_count": 3}
]"#;

fn at(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
}

fn store_for(server: &mockito::ServerGuard, token: Option<&str>) -> MetricStore {
    let api = ApiConfig {
        base_url: format!("{}/api/", server.url()),
        token: token.map(str::to_string),
        ..ApiConfig::default()
    };
    let fetcher = HttpTimeseriesFetcher::new(&api).unwrap();
    MetricStore::new(Arc::new(fetcher), PeriodConfig::default())
}

#[tokio::test]
async fn test_load_range_sends_iso_params_and_token() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/analytics/timeseries/")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("start".into(), "2024-01-01T00:00:00.000Z".into()),
            Matcher::UrlEncoded("end".into(), "2024-01-02T00:00:00.000Z".into()),
            Matcher::UrlEncoded("granularity".into(), "hour".into()),
        ]))
        .match_header("authorization", "Bearer t0ken")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(BODY)
        .create_async()
        .await;

    let store = store_for(&server, Some("t0ken"));
    let summary = store
        .load_range(at(0), at(0) + chrono::Duration::days(1))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(summary.records, 2);
    let eight = store.raw().get(at(8)).unwrap();
    assert_eq!(eight.revenue, 250.5);
    assert_eq!(eight.customers, 10);
    assert_eq!(eight.conversions, 7);

    let day = store.get_period(Granularity::Day, at(0));
    assert_eq!(day.metrics().peak, 250.5);
}

#[tokio::test]
async fn test_loading_same_range_twice_keeps_same_entries() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/analytics/timeseries/")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(BODY)
        .expect(2)
        .create_async()
        .await;

    let store = store_for(&server, None);
    store.load_range(at(0), at(23)).await.unwrap();
    let first = store.raw().entries();
    store.load_range(at(0), at(23)).await.unwrap();

    mock.assert_async().await;
    assert_eq!(store.raw().entries(), first);
    assert_eq!(store.raw().len(), 2);
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/analytics/timeseries/")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;

    let store = store_for(&server, None);
    let err = store.load_range(at(0), at(23)).await.unwrap_err();

    assert!(matches!(err, LoadError::Status { status: 500, .. }));
    assert!(err.is_transient());
    assert!(store.raw().is_empty());
}

#[tokio::test]
async fn test_malformed_body_is_a_decode_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/analytics/timeseries/")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"detail": "not a list"}"#)
        .create_async()
        .await;

    let store = store_for(&server, None);
    let err = store.load_range(at(0), at(23)).await.unwrap_err();
    assert!(matches!(err, LoadError::Decode { .. }));
}

#[tokio::test]
async fn test_unreachable_backend_is_a_request_error() {
    let api = ApiConfig {
        base_url: "http://127.0.0.1:1/api/".into(),
        ..ApiConfig::default()
    };
    let store = MetricStore::new(
        Arc::new(HttpTimeseriesFetcher::new(&api).unwrap()),
        PeriodConfig::default(),
    );

    let err = store.load_range(at(0), at(23)).await.unwrap_err();
    assert!(matches!(err, LoadError::Request { .. }));
}
