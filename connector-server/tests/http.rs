//! In-process HTTP integration tests driving the router via
//! `tower::ServiceExt::oneshot` against a `FakeTransport`-backed facade —
//! the axum equivalent of rondo's "open a real store in a tempdir, drive it
//! through the public API" test style (§8.1).

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use connector_core::client::{Facade, FakeTransport};
use connector_core::metrics::ConnectorMetrics;
use connector_core::model::{ColumnInfo, ColumnRole, Page, Row};
use connector_core::proto;
use connector_core::record_builder::{BuilderPolicy, RoutingConfig};
use connector_server::AppState;
use tower::ServiceExt;

const BASIC_AUTH: &str = "Basic dXNlcjpwYXNz";

fn build_app(transport: Arc<FakeTransport>) -> axum::Router {
    let registry = prometheus::Registry::new();
    let metrics = ConnectorMetrics::new(&registry).unwrap();
    let routing = RoutingConfig {
        default_database: "dbA".to_string(),
        default_table: "tblA".to_string(),
        database_label: None,
        table_label: None,
    };
    let facade = Facade::new(transport, metrics, routing, BuilderPolicy::default());
    let state = Arc::new(AppState { facade, registry });
    connector_server::router(state, "/metrics")
}

fn write_request_body() -> Vec<u8> {
    let request = proto::WriteRequest {
        timeseries: vec![proto::TimeSeries {
            labels: vec![proto::Label { name: "__name__".to_string(), value: "http_requests".to_string() }],
            samples: vec![proto::Sample { value: 42.0, timestamp: 1_700_000_000_000 }],
        }],
    };
    proto::encode(&request).unwrap()
}

#[tokio::test]
async fn s1_write_request_is_accepted_and_stored() {
    let transport = Arc::new(FakeTransport::new());
    let app = build_app(transport.clone());

    let request = Request::builder()
        .method("POST")
        .uri("/write")
        .header(header::AUTHORIZATION, BASIC_AUTH)
        .body(Body::from(write_request_body()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(transport.written_records("dbA", "tblA").unwrap().len(), 1);
}

#[tokio::test]
async fn write_without_basic_auth_is_rejected() {
    let transport = Arc::new(FakeTransport::new());
    let app = build_app(transport);

    let request = Request::builder().method("POST").uri("/write").body(Body::from(write_request_body())).unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn write_backend_failure_is_surfaced_as_its_status() {
    let transport = Arc::new(FakeTransport::new());
    transport.fail_with(409, "conflict");
    let app = build_app(transport);

    let request = Request::builder()
        .method("POST")
        .uri("/write")
        .header(header::AUTHORIZATION, BASIC_AUTH)
        .body(Body::from(write_request_body()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn s5_read_request_assembles_scripted_rows() {
    let transport = Arc::new(FakeTransport::new());
    transport.script_pages(vec![Page {
        columns: vec![
            ColumnInfo { name: "time".to_string(), role: ColumnRole::Time },
            ColumnInfo { name: "measure_name".to_string(), role: ColumnRole::MeasureName },
            ColumnInfo { name: "measure_value".to_string(), role: ColumnRole::MeasureValue },
        ],
        rows: vec![Row {
            values: vec![
                Some("2023-11-14 22:13:20.000000000".to_string()),
                Some("http_requests".to_string()),
                Some("42".to_string()),
            ],
        }],
    }]);
    let app = build_app(transport);

    let read_request = proto::ReadRequest {
        queries: vec![proto::Query {
            start_timestamp_ms: 1_700_000_000_000,
            end_timestamp_ms: 1_700_000_010_000,
            matchers: vec![proto::LabelMatcher { r#type: 0, name: "__name__".to_string(), value: "http_requests".to_string() }],
        }],
    };
    let body = proto::encode(&read_request).unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/read")
        .header(header::AUTHORIZATION, BASIC_AUTH)
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CONTENT_ENCODING).unwrap(), "snappy");

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let decoded: proto::ReadResponse = proto::decode(&body_bytes).unwrap();
    assert_eq!(decoded.results.len(), 1);
    assert_eq!(decoded.results[0].timeseries.len(), 1);
    assert_eq!(decoded.results[0].timeseries[0].samples[0].value, 42.0);
}

#[tokio::test]
async fn unknown_matcher_type_on_read_maps_to_400() {
    let transport = Arc::new(FakeTransport::new());
    let app = build_app(transport);

    let read_request = proto::ReadRequest {
        queries: vec![proto::Query {
            start_timestamp_ms: 0,
            end_timestamp_ms: 1,
            matchers: vec![proto::LabelMatcher { r#type: 9, name: "a".to_string(), value: "b".to_string() }],
        }],
    };
    let body = proto::encode(&read_request).unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/read")
        .header(header::AUTHORIZATION, BASIC_AUTH)
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn metrics_endpoint_reports_write_counter() {
    let transport = Arc::new(FakeTransport::new());
    let app = build_app(transport);

    let write = Request::builder()
        .method("POST")
        .uri("/write")
        .header(header::AUTHORIZATION, BASIC_AUTH)
        .body(Body::from(write_request_body()))
        .unwrap();
    app.clone().oneshot(write).await.unwrap();

    let scrape = Request::builder().method("GET").uri("/metrics").body(Body::empty()).unwrap();
    let response = app.oneshot(scrape).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body_bytes.to_vec()).unwrap();
    assert!(text.contains("timestream_connector_write_requests_total 1"));
}

