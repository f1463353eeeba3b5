//! The axum `Router` and its handlers, split from `main` so integration
//! tests can drive the app in-process via `tower::ServiceExt::oneshot`
//! without binding a socket (§8.1).

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use connector_core::client::Facade;
use connector_core::handler::{self, HandlerOutcome};
use connector_core::metrics::ConnectorMetrics;
use prometheus::Registry;

/// Shared state handed to every handler: the TSDB client facade and the
/// registry backing the telemetry endpoint.
pub struct AppState {
    pub facade: Facade,
    pub registry: Registry,
}

/// Builds the router: `/write`, `/read`, and `telemetry_path` for scraping.
#[must_use]
pub fn router(state: Arc<AppState>, telemetry_path: &str) -> Router {
    Router::new()
        .route("/write", post(write_handler))
        .route("/read", post(read_handler))
        .route(telemetry_path, get(metrics_handler))
        .with_state(state)
}

#[tracing::instrument(name = "write", skip_all, fields(body_len = body.len()))]
async fn write_handler(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    match run_write(&headers, &body, &state.facade).await {
        Ok(outcome) => outcome_response(outcome),
        Err(err) => {
            // A record-builder invariant violation means the configured policy
            // produced an error path it should never have reached — that is a
            // programming bug, not a caller mistake, so fail the process
            // instead of serving a misleading 5xx forever (§4.5's fatal-error policy).
            if err.is_fatal() {
                tracing::error!(error = %err, "fatal error on write path, exiting");
                std::process::exit(1);
            }
            tracing::warn!(error = %err, status = err.status_code(), "write request failed");
            error_response(&err)
        }
    }
}

#[tracing::instrument(name = "read", skip_all, fields(body_len = body.len()))]
async fn read_handler(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    match run_read(&headers, &body, &state.facade).await {
        Ok(outcome) => outcome_response(outcome),
        Err(err) => {
            tracing::warn!(error = %err, status = err.status_code(), "read request failed");
            error_response(&err)
        }
    }
}

async fn run_write(headers: &HeaderMap, body: &[u8], facade: &Facade) -> connector_core::error::Result<HandlerOutcome> {
    let credentials = handler::parse_basic_auth(headers.get(http::header::AUTHORIZATION))?;
    handler::handle_write(body, &credentials, facade).await
}

async fn run_read(headers: &HeaderMap, body: &[u8], facade: &Facade) -> connector_core::error::Result<HandlerOutcome> {
    let credentials = handler::parse_basic_auth(headers.get(http::header::AUTHORIZATION))?;
    handler::handle_read(body, &credentials, facade).await
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match ConnectorMetrics::render(&state.registry) {
        Ok(body) => (StatusCode::OK, [("content-type", "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to render metrics").into_response()
        }
    }
}

fn outcome_response(outcome: HandlerOutcome) -> Response {
    let status = StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::OK);
    let mut response = (status, outcome.body).into_response();
    if let Some(content_type) = outcome.content_type {
        response.headers_mut().insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static(content_type));
    }
    if let Some(content_encoding) = outcome.content_encoding {
        response.headers_mut().insert(http::header::CONTENT_ENCODING, http::HeaderValue::from_static(content_encoding));
    }
    response
}

fn error_response(err: &connector_core::error::ConnectorError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, err.to_string()).into_response()
}
