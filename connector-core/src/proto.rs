//! Prometheus remote-storage protobuf types and their snappy envelope.
//!
//! Hand-written types matching `prometheus/prompb/remote.proto` and
//! `prometheus/prompb/types.proto`. Using `prost` derives avoids the need for
//! `protoc` and `.proto` file management — the wire shapes are small and
//! stable enough to hand-maintain directly.

use crate::error::HandlerError;

/// A write request containing one or more time series.
#[derive(Clone, PartialEq, prost::Message)]
pub struct WriteRequest {
    /// The time series to write.
    #[prost(message, repeated, tag = "1")]
    pub timeseries: Vec<TimeSeries>,
}

/// A single time series with labels and samples.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TimeSeries {
    /// Metric labels identifying the series.
    #[prost(message, repeated, tag = "1")]
    pub labels: Vec<Label>,
    /// Data samples for this series.
    #[prost(message, repeated, tag = "2")]
    pub samples: Vec<Sample>,
}

/// A key-value label pair.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Label {
    /// Label name.
    #[prost(string, tag = "1")]
    pub name: String,
    /// Label value.
    #[prost(string, tag = "2")]
    pub value: String,
}

/// A single data sample (value + timestamp).
#[derive(Clone, PartialEq, prost::Message)]
pub struct Sample {
    /// The sample value.
    #[prost(double, tag = "1")]
    pub value: f64,
    /// Timestamp in milliseconds since epoch.
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
}

/// A label matcher's comparison type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum MatcherType {
    /// Equality.
    Eq = 0,
    /// Inequality.
    Neq = 1,
    /// Regular-expression match.
    Re = 2,
    /// Negated regular-expression match.
    Nre = 3,
}

/// A single label matcher.
#[derive(Clone, PartialEq, prost::Message)]
pub struct LabelMatcher {
    /// The comparison type.
    #[prost(enumeration = "MatcherType", tag = "1")]
    pub r#type: i32,
    /// The label name to match against.
    #[prost(string, tag = "2")]
    pub name: String,
    /// The literal value or regex pattern to match against.
    #[prost(string, tag = "3")]
    pub value: String,
}

/// A single sub-query within a `ReadRequest`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Query {
    /// Inclusive start of the query time range, in milliseconds.
    #[prost(int64, tag = "1")]
    pub start_timestamp_ms: i64,
    /// Inclusive end of the query time range, in milliseconds.
    #[prost(int64, tag = "2")]
    pub end_timestamp_ms: i64,
    /// The label matchers restricting this query.
    #[prost(message, repeated, tag = "3")]
    pub matchers: Vec<LabelMatcher>,
}

/// A batch of sub-queries.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ReadRequest {
    /// The sub-queries to execute.
    #[prost(message, repeated, tag = "1")]
    pub queries: Vec<Query>,
}

/// The result of a single sub-query.
#[derive(Clone, PartialEq, prost::Message)]
pub struct QueryResult {
    /// The time series matched by the sub-query.
    #[prost(message, repeated, tag = "1")]
    pub timeseries: Vec<TimeSeries>,
}

/// The response to a `ReadRequest`: one `QueryResult` per sub-query, in order.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ReadResponse {
    /// One result per input sub-query.
    #[prost(message, repeated, tag = "1")]
    pub results: Vec<QueryResult>,
}

/// Decompresses a snappy-framed buffer into protobuf bytes.
pub fn decompress(input: &[u8]) -> Result<Vec<u8>, snap::Error> {
    snap::raw::Decoder::new().decompress_vec(input)
}

/// Compresses protobuf bytes into the snappy frame the Prometheus wire
/// protocol expects.
pub fn compress(input: &[u8]) -> Result<Vec<u8>, snap::Error> {
    snap::raw::Encoder::new().compress_vec(input)
}

/// Decodes a snappy-compressed protobuf message.
pub fn decode<M: prost::Message + Default>(input: &[u8]) -> Result<M, HandlerError> {
    let decompressed = decompress(input)?;
    Ok(M::decode(decompressed.as_slice())?)
}

/// Encodes a message to protobuf, then snappy-compresses it.
pub fn encode<M: prost::Message>(message: &M) -> Result<Vec<u8>, HandlerError> {
    let mut buf = Vec::with_capacity(message.encoded_len());
    message.encode(&mut buf)?;
    Ok(compress(&buf)?)
}
