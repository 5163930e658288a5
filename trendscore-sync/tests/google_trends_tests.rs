//! Google Trends client against a mock HTTP server
//!
//! Also drives one full run through the real client, the SQLite store and a
//! local scoring program.

mod helpers;

use axum::extract::RawQuery;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use helpers::{count_rows, create_test_store, day, fast_retry, seed_model};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use trendscore_common::config::{GoogleConfig, LocalEngineConfig};
use trendscore_common::db::models::scores_between;
use trendscore_common::db::{InputSeries, ModelKind};
use trendscore_sync::fetcher::RateLimitedFetcher;
use trendscore_sync::scoring::LocalEngine;
use trendscore_sync::sources::{FetchError, FetchRequest, GoogleTrendsSource, SignalSource};
use trendscore_sync::ReconciliationEngine;

/// Serve `router` on an ephemeral port, returning its base URL
async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", address)
}

fn client(base_url: String) -> GoogleTrendsSource {
    let config = GoogleConfig {
        base_url,
        timeout_secs: 5,
        ..GoogleConfig::default()
    };
    GoogleTrendsSource::new(&config, Some("test-key".to_string())).unwrap()
}

fn series(names: &[&str]) -> Vec<InputSeries> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| InputSeries {
            id: i as i64 + 1,
            name: name.to_string(),
            region: None,
        })
        .collect()
}

/// Timeline JSON with `value` for every term on 2020-01-<days>
fn timeline_json(terms: &[&str], days: std::ops::RangeInclusive<u32>, value: f64) -> String {
    let lines: Vec<serde_json::Value> = terms
        .iter()
        .map(|term| {
            let points: Vec<serde_json::Value> = days
                .clone()
                .map(|d| serde_json::json!({ "date": format!("Jan {:02} 2020", d), "value": value }))
                .collect();
            serde_json::json!({ "term": term, "points": points })
        })
        .collect();
    serde_json::json!({ "lines": lines }).to_string()
}

#[tokio::test]
async fn test_request_parameters_and_parsing() {
    let seen: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let seen_in_handler = seen.clone();

    let router = Router::new().route(
        "/timelinesForHealth",
        get(move |RawQuery(query): RawQuery| {
            let seen = seen_in_handler.clone();
            async move {
                *seen.lock().unwrap() = query;
                timeline_json(&["flu", "sore throat"], 1..=3, 1.25)
            }
        }),
    );
    let source = client(serve(router).await);

    let requested = series(&["flu", "sore throat"]);
    let points = source
        .fetch(&FetchRequest {
            series: &requested,
            start: day(1),
            end: day(3),
        })
        .await
        .unwrap();

    assert_eq!(points.len(), 6);
    assert!(points.iter().all(|p| p.value == 1.25 && p.region.is_none()));
    assert_eq!(points[3].series_name, "sore throat");

    let query = seen.lock().unwrap().clone().unwrap();
    assert!(query.contains("terms=flu"));
    assert!(query.contains("terms=sore+throat"));
    assert!(query.contains("geoRestriction.region=GB-ENG"));
    assert!(query.contains("time.startDate=2020-01-01"));
    assert!(query.contains("time.endDate=2020-01-03"));
    assert!(query.contains("timelineResolution=day"));
    assert!(query.contains("key=test-key"));
}

#[tokio::test]
async fn test_error_statuses_are_classified() {
    let router = Router::new()
        .route("/throttled/timelinesForHealth", get(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }))
        .route("/broken/timelinesForHealth", get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "") }))
        .route("/rejected/timelinesForHealth", get(|| async { (StatusCode::BAD_REQUEST, "bad dates") }))
        .route("/garbled/timelinesForHealth", get(|| async { "<html>oops</html>" }));
    let base = serve(router).await;

    let requested = series(&["flu"]);
    let request = FetchRequest {
        series: &requested,
        start: day(1),
        end: day(2),
    };

    let err = client(format!("{}/throttled", base)).fetch(&request).await.unwrap_err();
    assert!(matches!(err, FetchError::RateLimited(_)));

    let err = client(format!("{}/broken", base)).fetch(&request).await.unwrap_err();
    assert!(matches!(err, FetchError::Transient(_)));

    let err = client(format!("{}/rejected", base)).fetch(&request).await.unwrap_err();
    assert!(matches!(err, FetchError::BadRequest(msg) if msg.contains("bad dates")));

    let err = client(format!("{}/garbled", base)).fetch(&request).await.unwrap_err();
    assert!(matches!(err, FetchError::Malformed(_)));
}

#[tokio::test]
async fn test_missing_key_fails_before_any_request() {
    let hits = Arc::new(Mutex::new(0usize));
    let hits_in_handler = hits.clone();
    let router = Router::new().route(
        "/timelinesForHealth",
        get(move || {
            let hits = hits_in_handler.clone();
            async move {
                *hits.lock().unwrap() += 1;
                timeline_json(&["flu"], 1..=1, 1.0)
            }
        }),
    );
    let config = GoogleConfig {
        base_url: serve(router).await,
        ..GoogleConfig::default()
    };
    let source = GoogleTrendsSource::new(&config, None).unwrap();

    let requested = series(&["flu"]);
    let err = source
        .fetch(&FetchRequest {
            series: &requested,
            start: day(1),
            end: day(1),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::NotConfigured(msg) if msg.contains("TRENDSCORE_GOOGLE_API_KEY")));
    assert!(!FetchError::NotConfigured(String::new()).is_recoverable());
    assert_eq!(*hits.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_connection_failure_is_transient() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let requested = series(&["flu"]);
    let err = client(format!("http://{}", address))
        .fetch(&FetchRequest {
            series: &requested,
            start: day(1),
            end: day(1),
        })
        .await
        .unwrap_err();
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_full_run_through_google_and_local_engine() {
    let router = Router::new().route(
        "/timelinesForHealth",
        get(|| async { timeline_json(&["flu", "fever"], 1..=31, 2.0) }),
    );
    let source = Arc::new(client(serve(router).await));

    let (_dir, pool, store) = create_test_store().await.unwrap();
    let model = seed_model(&pool, "flu-search", ModelKind::Search, 3, &[("flu", None), ("fever", None)])
        .await
        .unwrap();

    // Scores each day as the number of input lines
    let scoring = LocalEngine::new(&LocalEngineConfig {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), "wc -l < {input} > {output}".to_string()],
        working_dir: None,
    });

    let engine = ReconciliationEngine::new(store.clone())
        .with_fetcher(RateLimitedFetcher::new(source, fast_retry(3)))
        .with_scoring(Arc::new(scoring));

    let report = engine.run(&model, day(10), day(12), None).await.unwrap();

    // The mock answers with the whole month; only the requested range is kept
    assert_eq!(report.points_upserted, 12);
    assert_eq!(count_rows(&pool, "raw_points").await, 12);

    let values: Vec<f64> = scores_between(&pool, model.id, "e", day(10), day(12))
        .await
        .unwrap()
        .iter()
        .map(|s| s.value)
        .collect();
    assert_eq!(values, vec![2.0, 2.0, 2.0]);
}
