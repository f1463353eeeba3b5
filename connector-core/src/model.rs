//! Domain types the pure transforms operate on.
//!
//! These are deliberately plain Rust (`String`, `f64`, `i64`) rather than the
//! `proto` module's wire types — the record builder, query compiler, and
//! result assembler never see a `prost::Message` directly. `From`/`TryFrom`
//! conversions at the bottom of this module bridge the two at the HTTP
//! boundary, mirroring `rondo::remote_write`'s label-assembly free functions
//! (`build_labels`) but running in the opposite direction: wire bytes in,
//! domain values out.

use crate::error::QueryCompilerError;
use crate::proto;

/// A single (name, value) label pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Label {
    /// Label name.
    pub name: String,
    /// Label value.
    pub value: String,
}

/// A single (timestamp, value) sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// The sample value. May be NaN or infinite before validation.
    pub value: f64,
}

/// An unordered set of labels plus an ordered sequence of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    /// This series' labels. Exactly one should be named `__name__`.
    pub labels: Vec<Label>,
    /// Samples for this series, in arrival order.
    pub samples: Vec<Sample>,
}

impl TimeSeries {
    /// Returns the value of the `__name__` label, if present.
    pub fn metric_name(&self) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.name == "__name__")
            .map(|l| l.value.as_str())
    }

    /// Returns the value of the named label, if present.
    pub fn label_value(&self, name: &str) -> Option<&str> {
        self.labels.iter().find(|l| l.name == name).map(|l| l.value.as_str())
    }
}

/// A batch of time series offered for ingest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteRequest {
    /// The series to ingest.
    pub timeseries: Vec<TimeSeries>,
}

/// A label matcher's comparison type (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherType {
    /// Equality.
    Eq,
    /// Inequality.
    Neq,
    /// RE2-style regular-expression match.
    Re,
    /// Negated RE2-style regular-expression match.
    Nre,
}

/// A single label matcher.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMatcher {
    /// The label name to match against.
    pub name: String,
    /// The literal value (EQ/NEQ) or regex pattern (RE/NRE) to match against.
    pub value: String,
    /// The comparison type.
    pub matcher_type: MatcherType,
}

/// A single sub-query within a `ReadRequest`.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Inclusive start of the query time range, in milliseconds.
    pub start_ms: i64,
    /// Inclusive end of the query time range, in milliseconds.
    pub end_ms: i64,
    /// The label matchers restricting this query. Non-empty.
    pub matchers: Vec<LabelMatcher>,
}

/// A batch of sub-queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadRequest {
    /// The sub-queries to execute, in order.
    pub queries: Vec<Query>,
}

/// The TSDB's ingest unit, constructed by the record builder (§4.1).
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Destination database.
    pub database: String,
    /// Destination table.
    pub table: String,
    /// Categorical dimensions, excluding the measure name and routing labels.
    pub dimensions: Vec<Label>,
    /// The metric name, stripped from `__name__` and used as the measure name.
    pub measure_name: String,
    /// The sample value, serialized as a fixed-precision decimal string.
    pub measure_value: String,
    /// Milliseconds since the Unix epoch, as a decimal string.
    pub time: String,
    /// Always `"double"` — retained as a field so the builder stays the
    /// single place that decides it.
    pub measure_value_type: &'static str,
    /// Always `"milliseconds"`.
    pub time_unit: &'static str,
}

/// A grouping of records by destination, as produced by the record builder.
pub type Grouping = std::collections::BTreeMap<String, std::collections::BTreeMap<String, Vec<Record>>>;

/// Column metadata accompanying a page of TSDB query rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// The column's name, as returned by the backend.
    pub name: String,
    /// Which semantic role this column plays in result assembly.
    pub role: ColumnRole,
}

/// The semantic role a TSDB result column plays when reassembling time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// The row's timestamp, in the backend's `YYYY-MM-DD HH:MM:SS.fffffffff` format.
    Time,
    /// The row's measure value (the sample value).
    MeasureValue,
    /// The row's measure name (the Prometheus metric name).
    MeasureName,
    /// Any other column — emitted as a label named after the column.
    Dimension,
}

/// A single row of backend query results. `None` entries are SQL NULLs.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// One string-encoded value per column, in `ColumnInfo` order.
    pub values: Vec<Option<String>>,
}

/// One page of TSDB query results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Column metadata, shared by every row in this page.
    pub columns: Vec<ColumnInfo>,
    /// The page's rows.
    pub rows: Vec<Row>,
}

// -- wire <-> domain conversions -------------------------------------------

impl From<proto::Label> for Label {
    fn from(l: proto::Label) -> Self {
        Label { name: l.name, value: l.value }
    }
}

impl From<Label> for proto::Label {
    fn from(l: Label) -> Self {
        proto::Label { name: l.name, value: l.value }
    }
}

impl From<proto::Sample> for Sample {
    fn from(s: proto::Sample) -> Self {
        Sample { timestamp_ms: s.timestamp, value: s.value }
    }
}

impl From<Sample> for proto::Sample {
    fn from(s: Sample) -> Self {
        proto::Sample { timestamp: s.timestamp_ms, value: s.value }
    }
}

impl From<proto::TimeSeries> for TimeSeries {
    fn from(t: proto::TimeSeries) -> Self {
        TimeSeries {
            labels: t.labels.into_iter().map(Label::from).collect(),
            samples: t.samples.into_iter().map(Sample::from).collect(),
        }
    }
}

impl From<TimeSeries> for proto::TimeSeries {
    fn from(t: TimeSeries) -> Self {
        proto::TimeSeries {
            labels: t.labels.into_iter().map(proto::Label::from).collect(),
            samples: t.samples.into_iter().map(proto::Sample::from).collect(),
        }
    }
}

impl From<proto::WriteRequest> for WriteRequest {
    fn from(w: proto::WriteRequest) -> Self {
        WriteRequest { timeseries: w.timeseries.into_iter().map(TimeSeries::from).collect() }
    }
}

impl From<WriteRequest> for proto::WriteRequest {
    fn from(w: WriteRequest) -> Self {
        proto::WriteRequest { timeseries: w.timeseries.into_iter().map(proto::TimeSeries::from).collect() }
    }
}

impl TryFrom<proto::LabelMatcher> for LabelMatcher {
    type Error = QueryCompilerError;

    fn try_from(m: proto::LabelMatcher) -> Result<Self, Self::Error> {
        let matcher_type = match m.r#type {
            0 => MatcherType::Eq,
            1 => MatcherType::Neq,
            2 => MatcherType::Re,
            3 => MatcherType::Nre,
            other => return Err(QueryCompilerError::UnknownMatcher(other)),
        };
        Ok(LabelMatcher { name: m.name, value: m.value, matcher_type })
    }
}

impl TryFrom<proto::Query> for Query {
    type Error = QueryCompilerError;

    fn try_from(q: proto::Query) -> Result<Self, Self::Error> {
        Ok(Query {
            start_ms: q.start_timestamp_ms,
            end_ms: q.end_timestamp_ms,
            matchers: q
                .matchers
                .into_iter()
                .map(LabelMatcher::try_from)
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}

impl TryFrom<proto::ReadRequest> for ReadRequest {
    type Error = QueryCompilerError;

    fn try_from(r: proto::ReadRequest) -> Result<Self, Self::Error> {
        Ok(ReadRequest { queries: r.queries.into_iter().map(Query::try_from).collect::<Result<Vec<_>, _>>()? })
    }
}

/// Builds a `proto::ReadResponse` from per-query result sets.
pub fn read_response_to_proto(results: Vec<Vec<TimeSeries>>) -> proto::ReadResponse {
    proto::ReadResponse {
        results: results
            .into_iter()
            .map(|timeseries| proto::QueryResult {
                timeseries: timeseries.into_iter().map(proto::TimeSeries::from).collect(),
            })
            .collect(),
    }
}
