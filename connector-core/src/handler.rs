//! Framing-agnostic HTTP/FaaS handler shell (§4.5, §4.5.1).
//!
//! `handle_write`/`handle_read` take already-extracted `(body bytes,
//! credentials)` and return an outcome the caller encodes into whatever
//! transport framing it owns. Two callers wrap them: `connector-server`'s
//! axum routes, and [`handle_envelope`] below for a single-entry-point
//! FaaS deployment. Adapted from the `evanxg852000-clicktsdb`
//! `PrometheusStorage::write`/`read` split (decode → delegate → re-encode,
//! kept separate from the axum route functions) generalized so the same
//! logic serves both framings instead of being coupled to axum's
//! `IntoResponse`.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use http::HeaderMap;

use crate::client::{Credentials, Facade};
use crate::error::{ConnectorError, HandlerError};
use crate::model::{read_response_to_proto, ReadRequest, WriteRequest};
use crate::proto;

/// Header that discriminates a write request from a read request when both
/// endpoints are multiplexed onto a single FaaS entry point (§4.5).
pub const WRITE_VERSION_HEADER: &str = "x-prometheus-remote-write-version";
/// See [`WRITE_VERSION_HEADER`].
pub const READ_VERSION_HEADER: &str = "x-prometheus-remote-read-version";

/// A handler's response, framing-agnostic: the caller attaches these to
/// whatever transport it owns (axum `Response`, FaaS envelope, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOutcome {
    /// HTTP status code.
    pub status: u16,
    /// `Content-Type` header value, if any.
    pub content_type: Option<&'static str>,
    /// `Content-Encoding` header value, if any.
    pub content_encoding: Option<&'static str>,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl HandlerOutcome {
    fn empty_ok() -> Self {
        Self { status: 200, content_type: None, content_encoding: None, body: Vec::new() }
    }

    fn protobuf_snappy(status: u16, body: Vec<u8>) -> Self {
        Self { status, content_type: Some("application/x-protobuf"), content_encoding: Some("snappy"), body }
    }
}

/// Parses an `Authorization: Basic <base64>` header into credentials.
///
/// Base64 decoding is strict (no newline tolerance, per §9's
/// credential-parsing design note): the authorization header is treated as
/// opaque bytes, not a locale-aware string.
///
/// # Errors
///
/// Returns `ParseBasicAuthHeader` if the header is absent, not UTF-8, not
/// prefixed with `Basic `, not valid base64, not valid UTF-8 once decoded,
/// or missing the `:` separator.
pub fn parse_basic_auth(header_value: Option<&http::HeaderValue>) -> Result<Credentials, HandlerError> {
    match parse_basic_auth_inner(header_value) {
        Ok(credentials) => Ok(credentials),
        Err(e) => {
            tracing::warn!(error = %e, "failed to parse basic authentication header");
            Err(e)
        }
    }
}

fn parse_basic_auth_inner(header_value: Option<&http::HeaderValue>) -> Result<Credentials, HandlerError> {
    let header_value = header_value
        .ok_or_else(|| HandlerError::ParseBasicAuthHeader("missing basic authentication header".to_string()))?;
    let header_str = header_value
        .to_str()
        .map_err(|_| HandlerError::ParseBasicAuthHeader("authorization header is not valid UTF-8".to_string()))?;

    let encoded = header_str
        .strip_prefix("Basic ")
        .ok_or_else(|| HandlerError::ParseBasicAuthHeader("expected a Basic basic authentication scheme".to_string()))?;

    let decoded = BASE64_STANDARD
        .decode(encoded)
        .map_err(|e| HandlerError::ParseBasicAuthHeader(format!("invalid base64: {e}")))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| HandlerError::ParseBasicAuthHeader("decoded basic authentication is not valid UTF-8".to_string()))?;

    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| HandlerError::ParseBasicAuthHeader("missing ':' separator in basic authentication".to_string()))?;

    Ok(Credentials { username: username.to_string(), password: password.to_string() })
}

/// Decodes a snappy-compressed protobuf `WriteRequest`, builds records, and
/// writes them through `facade`. Returns an empty 200 body on success.
///
/// # Errors
///
/// Returns `HandlerError` variants for decode/decompress failures, or the
/// facade's `ClientError` wrapped as `ConnectorError::Client`.
pub async fn handle_write(
    body: &[u8],
    credentials: &Credentials,
    facade: &Facade,
) -> Result<HandlerOutcome, ConnectorError> {
    let decoded: proto::WriteRequest = proto::decode(body).inspect_err(|e| {
        tracing::warn!(error = %e, "write request failed to decode");
    })?;
    let series_count = decoded.timeseries.len();
    let request = WriteRequest::from(decoded);
    tracing::debug!(series_count, "decoded write request");

    facade.write(request, credentials).await.inspect_err(|e| {
        tracing::warn!(error = %e, "write request dispatch failed");
    })?;

    Ok(HandlerOutcome::empty_ok())
}

/// Decodes a snappy-compressed protobuf `ReadRequest`, runs it through
/// `facade`, and re-encodes the result as a snappy-compressed
/// `ReadResponse`.
///
/// # Errors
///
/// Returns `HandlerError` variants for decode/encode failures, the query
/// compiler's error if a matcher is malformed, or the facade's
/// `ClientError` wrapped as `ConnectorError::Client`.
pub async fn handle_read(
    body: &[u8],
    credentials: &Credentials,
    facade: &Facade,
) -> Result<HandlerOutcome, ConnectorError> {
    let decoded: proto::ReadRequest = proto::decode(body).inspect_err(|e| {
        tracing::warn!(error = %e, "read request failed to decode");
    })?;
    let query_count = decoded.queries.len();
    let request = ReadRequest::try_from(decoded).inspect_err(|e| {
        tracing::warn!(error = %e, "read request failed to convert from wire format");
    })?;
    tracing::debug!(query_count, "decoded read request");

    let results = facade.read(request, credentials).await.inspect_err(|e| {
        tracing::warn!(error = %e, "read request dispatch failed");
    })?;

    let response = read_response_to_proto(results);
    let encoded = proto::encode(&response).inspect_err(|e| {
        tracing::warn!(error = %e, "read response failed to encode");
    })?;
    tracing::debug!(encoded_len = encoded.len(), "encoded read response");

    Ok(HandlerOutcome::protobuf_snappy(200, encoded))
}

/// A single entry point for a function-as-a-service deployment (§6): reads
/// the write/read discriminator header instead of relying on a URL path,
/// and delegates to the same [`handle_write`]/[`handle_read`] the
/// long-running server uses.
///
/// # Errors
///
/// Returns `HandlerError::MissingHeader` if neither discriminator header is
/// present, `HandlerError::ParseBasicAuthHeader` if the `Authorization`
/// header is missing or malformed, or whatever `handle_write`/`handle_read`
/// returns.
pub async fn handle_envelope(
    headers: &HeaderMap,
    body: &[u8],
    facade: &Facade,
) -> Result<HandlerOutcome, ConnectorError> {
    let credentials = parse_basic_auth(headers.get(http::header::AUTHORIZATION))?;

    if headers.contains_key(WRITE_VERSION_HEADER) {
        tracing::debug!("dispatching envelope as a write request");
        handle_write(body, &credentials, facade).await
    } else if headers.contains_key(READ_VERSION_HEADER) {
        tracing::debug!("dispatching envelope as a read request");
        handle_read(body, &credentials, facade).await
    } else {
        tracing::warn!("envelope carried neither write nor read discriminator header");
        Err(HandlerError::MissingHeader.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FakeTransport;
    use crate::metrics::ConnectorMetrics;
    use crate::record_builder::{BuilderPolicy, RoutingConfig};
    use http::HeaderValue;
    use std::sync::Arc;

    fn facade() -> Facade {
        let transport = Arc::new(FakeTransport::new());
        let registry = prometheus::Registry::new();
        let metrics = ConnectorMetrics::new(&registry).unwrap();
        let routing = RoutingConfig {
            default_database: "dbA".to_string(),
            default_table: "tblA".to_string(),
            database_label: None,
            table_label: None,
        };
        Facade::new(transport, metrics, routing, BuilderPolicy::default())
    }

    fn encode_write(request: proto::WriteRequest) -> Vec<u8> {
        proto::encode(&request).unwrap()
    }

    #[test]
    fn parse_basic_auth_rejects_missing_header() {
        let err = parse_basic_auth(None).unwrap_err();
        assert!(err.to_string().contains("basic authentication"));
    }

    #[test]
    fn parse_basic_auth_decodes_username_password() {
        let header = HeaderValue::from_static("Basic dXNlcjpwYXNz");
        let creds = parse_basic_auth(Some(&header)).unwrap();
        assert_eq!(creds.username, "user");
        assert_eq!(creds.password, "pass");
    }

    #[test]
    fn parse_basic_auth_rejects_non_basic_scheme() {
        let header = HeaderValue::from_static("Bearer sometoken");
        let err = parse_basic_auth(Some(&header)).unwrap_err();
        assert!(matches!(err, HandlerError::ParseBasicAuthHeader(_)));
    }

    #[tokio::test]
    async fn handle_write_returns_empty_200_body() {
        let facade = facade();
        let request = proto::WriteRequest {
            timeseries: vec![proto::TimeSeries {
                labels: vec![proto::Label { name: "__name__".to_string(), value: "m".to_string() }],
                samples: vec![proto::Sample { value: 1.0, timestamp: 1 }],
            }],
        };
        let body = encode_write(request);
        let outcome = handle_write(&body, &Credentials::default(), &facade).await.unwrap();
        assert_eq!(outcome.status, 200);
        assert!(outcome.body.is_empty());
    }

    #[tokio::test]
    async fn handle_envelope_requires_a_discriminator_header() {
        let facade = facade();
        let mut headers = HeaderMap::new();
        headers.insert(http::header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        let err = handle_envelope(&headers, &[], &facade).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn handle_envelope_dispatches_write_by_header() {
        let facade = facade();
        let mut headers = HeaderMap::new();
        headers.insert(http::header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        headers.insert(WRITE_VERSION_HEADER, HeaderValue::from_static("0.1.0"));

        let request = proto::WriteRequest {
            timeseries: vec![proto::TimeSeries {
                labels: vec![proto::Label { name: "__name__".to_string(), value: "m".to_string() }],
                samples: vec![proto::Sample { value: 1.0, timestamp: 1 }],
            }],
        };
        let body = encode_write(request);

        let outcome = handle_envelope(&headers, &body, &facade).await.unwrap();
        assert_eq!(outcome.status, 200);
    }

    #[tokio::test]
    async fn unknown_matcher_type_maps_to_400() {
        let facade = facade();
        let request = proto::ReadRequest {
            queries: vec![proto::Query {
                start_timestamp_ms: 0,
                end_timestamp_ms: 1,
                matchers: vec![proto::LabelMatcher { r#type: 9, name: "a".to_string(), value: "b".to_string() }],
            }],
        };
        let body = proto::encode(&request).unwrap();
        let err = handle_read(&body, &Credentials::default(), &facade).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
