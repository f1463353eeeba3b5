//! Error types for the Prometheus-to-TSDB connector.
//!
//! One concern per variant group, each carrying only the fields it needs,
//! unified under a single [`ConnectorError`] with an HTTP status derivation
//! so call sites never hand-pick a code.

use thiserror::Error;

/// The umbrella error type returned by every pipeline stage.
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Error while grouping a `WriteRequest` into TSDB records.
    #[error("record builder error: {0}")]
    RecordBuilder(#[from] RecordBuilderError),

    /// Error while compiling a Prometheus query into SQL.
    #[error("query compiler error: {0}")]
    QueryCompiler(#[from] QueryCompilerError),

    /// Error while reassembling TSDB rows into a Prometheus response.
    #[error("result assembler error: {0}")]
    ResultAssembler(#[from] ResultAssemblerError),

    /// Error talking to the TSDB backend.
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// Error in the HTTP/FaaS handler shell itself (decode, auth, framing).
    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),
}

impl ConnectorError {
    /// The HTTP status code this error should be surfaced as, per the
    /// connector's error-mapping table.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::RecordBuilder(e) => e.status_code(),
            Self::QueryCompiler(e) => e.status_code(),
            Self::ResultAssembler(_) => 400,
            Self::Client(e) => e.status_code(),
            Self::Handler(e) => e.status_code(),
        }
    }

    /// True if this error should terminate the process rather than be
    /// surfaced as a 4xx (§4.5's "fatal-error policy").
    ///
    /// Only a record-builder error that the caller could not have produced
    /// through normal input (i.e. a policy/programming inconsistency) is
    /// fatal; the known 400-mapped kinds never are.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RecordBuilder(RecordBuilderError::Invariant(_)))
    }
}

/// Errors that can occur while grouping a `WriteRequest` into TSDB records (§4.1).
#[derive(Error, Debug)]
pub enum RecordBuilderError {
    /// Neither a routing label nor a configured default resolved a database.
    #[error("missing database: no routing label or default-database configured")]
    MissingDatabase,

    /// Neither a routing label nor a configured default resolved a table.
    #[error("missing table: no routing label or default-table configured")]
    MissingTable,

    /// A metric or dimension name exceeded the 60-byte limit and
    /// `fail-on-long-label` is enabled.
    #[error("label name '{name}' is {len} bytes, exceeds the 60-byte limit")]
    LongLabelName {
        /// The offending name.
        name: String,
        /// Its length in bytes.
        len: usize,
    },

    /// A sample value was NaN or ±Inf and `fail-on-invalid-sample-value` is
    /// enabled.
    #[error("sample value {value} is not finite")]
    InvalidSampleValue {
        /// The offending value.
        value: f64,
    },

    /// An internal invariant was violated (a programming bug, not a caller
    /// mistake) — e.g. a resolved destination reached grouping insertion
    /// empty, after the `MissingDatabase`/`MissingTable` checks should
    /// already have rejected it. See [`ConnectorError::is_fatal`].
    #[error("record builder invariant violated: {0}")]
    Invariant(String),
}

impl RecordBuilderError {
    /// HTTP status this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Invariant(_) => 500,
            _ => 400,
        }
    }
}

/// Errors that can occur while compiling a Prometheus query into SQL (§4.2).
#[derive(Error, Debug)]
pub enum QueryCompilerError {
    /// No routing matcher or default resolved a database for this query.
    #[error("missing database: no routing matcher or default-database configured")]
    MissingDatabase,

    /// No routing matcher or default resolved a table for this query.
    #[error("missing table: no routing matcher or default-table configured")]
    MissingTable,

    /// A matcher used a type outside {EQ, NEQ, RE, NRE}.
    #[error("unknown matcher type {0}")]
    UnknownMatcher(i32),
}

impl QueryCompilerError {
    /// HTTP status this error maps to.
    pub fn status_code(&self) -> u16 {
        400
    }
}

/// Errors that can occur while reassembling TSDB rows into time series (§4.3).
#[derive(Error, Debug)]
pub enum ResultAssemblerError {
    /// The time column's value did not match the expected timestamp format.
    #[error("invalid time value '{0}'")]
    InvalidTime(String),

    /// The measure-value column's value did not parse as a 64-bit float.
    #[error("invalid measure value '{0}'")]
    InvalidValue(String),
}

/// Errors that can occur in the TSDB client facade (§4.4).
#[derive(Error, Debug)]
pub enum ClientError {
    /// The backend returned an HTTP-style status code.
    #[error("backend returned status {status}: {body}{hint}", hint = regex_hint(*regex_matchers, *status))]
    Backend {
        /// The status code the backend reported.
        status: u16,
        /// The backend's response body, if any.
        body: String,
        /// Whether the originating query used a regex matcher — controls
        /// whether the "possibly an unsupported regex syntax" hint is
        /// appended to the message.
        regex_matchers: bool,
    },

    /// The backend transport itself failed (connection, TLS, decode).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The client facade was used before being configured, or after
    /// shutdown began (§4.4's three-state machine).
    #[error("client is not ready: {0}")]
    NotReady(&'static str),
}

fn regex_hint(regex_matchers: bool, status: u16) -> &'static str {
    if regex_matchers && (400..500).contains(&status) {
        " (possibly an unsupported regex syntax)"
    } else {
        ""
    }
}

impl ClientError {
    /// HTTP status this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Backend { status, .. } => *status,
            Self::Transport(_) => 502,
            Self::NotReady(_) => 503,
        }
    }
}

/// Errors that can occur in the HTTP/FaaS handler shell itself (§4.5).
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The `Authorization` header was missing, malformed, or not Basic.
    #[error("failed to parse basic authentication header: {0}")]
    ParseBasicAuthHeader(String),

    /// Neither `x-prometheus-remote-write-version` nor
    /// `x-prometheus-remote-read-version` was present (FaaS entry point).
    #[error("missing x-prometheus-remote-write-version or x-prometheus-remote-read-version header")]
    MissingHeader,

    /// Snappy decompression failed.
    #[error("failed to decompress snappy payload: {0}")]
    Decompress(#[from] snap::Error),

    /// Protobuf decoding failed.
    #[error("failed to decode protobuf payload: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Protobuf encoding failed (response path).
    #[error("failed to encode protobuf payload: {0}")]
    Encode(#[from] prost::EncodeError),
}

impl HandlerError {
    /// HTTP status this error maps to.
    pub fn status_code(&self) -> u16 {
        400
    }
}

/// Type alias for `Result<T, ConnectorError>`.
pub type Result<T> = std::result::Result<T, ConnectorError>;
