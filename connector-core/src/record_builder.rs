//! Groups a `WriteRequest` into per-destination records (§4.1).
//!
//! A pure transform: no I/O, no shared state beyond the metrics handle it's
//! given to record ignored samples. Mirrors `rondo::remote_write`'s
//! `build_write_request` in shape — one free function per concern, composed
//! by `build`.

use crate::error::RecordBuilderError;
use crate::metrics::IngestMetrics;
use crate::model::{Grouping, Label, Record, TimeSeries, WriteRequest};

/// Maximum length, in bytes, of a metric name or dimension name (§3 invariants).
pub const MAX_LABEL_NAME_LEN: usize = 60;

/// Destination routing configuration shared by the builder and compiler.
#[derive(Debug, Clone, Default)]
pub struct RoutingConfig {
    /// Fallback database used when no routing label resolves one.
    pub default_database: String,
    /// Fallback table used when no routing label resolves one.
    pub default_table: String,
    /// Name of the label that, when present, overrides the destination database.
    pub database_label: Option<String>,
    /// Name of the label that, when present, overrides the destination table.
    pub table_label: Option<String>,
}

/// Policy flags controlling how the builder reacts to invalid input (§4.1).
#[derive(Debug, Clone, Copy, Default)]
pub struct BuilderPolicy {
    /// Error instead of silently dropping a series with an over-long name.
    pub fail_on_long_label: bool,
    /// Error instead of silently dropping a non-finite sample.
    pub fail_on_invalid_sample: bool,
}

/// Groups a `WriteRequest`'s series into per-(database, table) record batches.
///
/// # Errors
///
/// Returns `RecordBuilderError::MissingDatabase`/`MissingTable` if a series
/// resolves no destination, `LongLabelName` if `fail_on_long_label` is set
/// and a name exceeds [`MAX_LABEL_NAME_LEN`], or `InvalidSampleValue` if
/// `fail_on_invalid_sample` is set and a sample is NaN or infinite.
pub fn build(
    request: WriteRequest,
    routing: &RoutingConfig,
    policy: BuilderPolicy,
    metrics: &IngestMetrics,
) -> Result<Grouping, RecordBuilderError> {
    let mut grouping: Grouping = Grouping::new();

    for series in request.timeseries {
        metrics.received_samples.inc_by(series.samples.len() as f64);

        let Some(resolved) = resolve_series(series, routing, policy, metrics)? else {
            continue;
        };
        ensure_resolved_destination(&resolved.database, &resolved.table)?;

        let table_map = grouping.entry(resolved.database).or_default();
        let records = table_map.entry(resolved.table).or_default();
        records.extend(resolved.records);
    }

    Ok(grouping)
}

/// Defends `resolve_series`'s own contract: by the time a series reaches
/// grouping insertion, `MissingDatabase`/`MissingTable` must already have
/// rejected any empty destination. Tripping this means a future change to
/// the resolution order let one slip through — a programming bug, not bad
/// caller input, hence `RecordBuilderError::Invariant` rather than one of
/// the 400-mapped kinds.
fn ensure_resolved_destination(database: &str, table: &str) -> Result<(), RecordBuilderError> {
    if database.is_empty() || table.is_empty() {
        return Err(RecordBuilderError::Invariant(format!(
            "resolved destination was empty after passing missing-database/table checks \
             (database={database:?}, table={table:?})"
        )));
    }
    Ok(())
}

struct ResolvedSeries {
    database: String,
    table: String,
    records: Vec<Record>,
}

/// Resolves one series' destination and emits its records, or `None` if the
/// series was dropped by policy (long label or zero valid samples).
fn resolve_series(
    series: TimeSeries,
    routing: &RoutingConfig,
    policy: BuilderPolicy,
    metrics: &IngestMetrics,
) -> Result<Option<ResolvedSeries>, RecordBuilderError> {
    let sample_count = series.samples.len() as f64;

    let mut database = routing.default_database.clone();
    let mut table = routing.default_table.clone();
    let mut dimensions = Vec::with_capacity(series.labels.len());
    let mut measure_name = None;

    for label in series.labels {
        if routing.database_label.as_deref() == Some(label.name.as_str()) {
            database = label.value;
        } else if routing.table_label.as_deref() == Some(label.name.as_str()) {
            table = label.value;
        } else if label.name == "__name__" {
            measure_name = Some(label.value);
        } else {
            dimensions.push(label);
        }
    }

    if database.is_empty() {
        return Err(RecordBuilderError::MissingDatabase);
    }
    if table.is_empty() {
        return Err(RecordBuilderError::MissingTable);
    }

    let measure_name = measure_name.unwrap_or_default();

    if let Some(long) = over_long_name(&measure_name, &dimensions) {
        if policy.fail_on_long_label {
            return Err(RecordBuilderError::LongLabelName { name: long.0, len: long.1 });
        }
        metrics.ignored_samples.inc_by(sample_count);
        return Ok(None);
    }

    let mut records = Vec::with_capacity(series.samples.len());
    for sample in series.samples {
        if !sample.value.is_finite() {
            if policy.fail_on_invalid_sample {
                return Err(RecordBuilderError::InvalidSampleValue { value: sample.value });
            }
            metrics.ignored_samples.inc_by(1.0);
            continue;
        }

        records.push(Record {
            database: database.clone(),
            table: table.clone(),
            dimensions: dimensions.clone(),
            measure_name: measure_name.clone(),
            measure_value: format!("{:.6}", sample.value),
            time: sample.timestamp_ms.to_string(),
            measure_value_type: "double",
            time_unit: "milliseconds",
        });
    }

    if records.is_empty() {
        return Ok(None);
    }

    Ok(Some(ResolvedSeries { database, table, records }))
}

/// Returns the first name (and its length) exceeding [`MAX_LABEL_NAME_LEN`],
/// checking the measure name first and then each dimension.
fn over_long_name(measure_name: &str, dimensions: &[Label]) -> Option<(String, usize)> {
    if measure_name.len() > MAX_LABEL_NAME_LEN {
        return Some((measure_name.to_string(), measure_name.len()));
    }
    dimensions
        .iter()
        .find(|d| d.name.len() > MAX_LABEL_NAME_LEN)
        .map(|d| (d.name.clone(), d.name.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sample;

    fn routing() -> RoutingConfig {
        RoutingConfig {
            default_database: String::new(),
            default_table: String::new(),
            database_label: Some("db_label".to_string()),
            table_label: Some("tbl_label".to_string()),
        }
    }

    fn series(labels: Vec<(&str, &str)>, samples: Vec<(i64, f64)>) -> TimeSeries {
        TimeSeries {
            labels: labels
                .into_iter()
                .map(|(n, v)| Label { name: n.to_string(), value: v.to_string() })
                .collect(),
            samples: samples.into_iter().map(|(t, v)| Sample { timestamp_ms: t, value: v }).collect(),
        }
    }

    #[test]
    fn s1_ingest_one_series() {
        let request = WriteRequest {
            timeseries: vec![series(
                vec![
                    ("__name__", "go_gc_duration_seconds"),
                    ("label_1", "value_1"),
                    ("db_label", "dbA"),
                    ("tbl_label", "tblA"),
                ],
                vec![(1_700_000_000_000, 0.001995)],
            )],
        };

        let metrics = IngestMetrics::new_unregistered();
        let grouping = build(request, &routing(), BuilderPolicy::default(), &metrics).unwrap();

        let records = &grouping["dbA"]["tblA"];
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.dimensions, vec![Label { name: "label_1".to_string(), value: "value_1".to_string() }]);
        assert_eq!(record.measure_name, "go_gc_duration_seconds");
        assert_eq!(record.measure_value, "0.001995");
        assert_eq!(record.time, "1700000000000");
        assert_eq!(record.measure_value_type, "double");
        assert_eq!(record.time_unit, "milliseconds");
    }

    #[test]
    fn s2_drops_non_finite_sample_when_fail_fast_off() {
        let request = WriteRequest {
            timeseries: vec![series(
                vec![("__name__", "m"), ("db_label", "dbA"), ("tbl_label", "tblA")],
                vec![(1, 1.0), (2, f64::NAN)],
            )],
        };

        let metrics = IngestMetrics::new_unregistered();
        let grouping = build(request, &routing(), BuilderPolicy::default(), &metrics).unwrap();

        assert_eq!(grouping["dbA"]["tblA"].len(), 1);
        assert_eq!(metrics.ignored_samples.get(), 1);
    }

    #[test]
    fn s3_rejects_non_finite_sample_when_fail_fast_on() {
        let request = WriteRequest {
            timeseries: vec![series(
                vec![("__name__", "m"), ("db_label", "dbA"), ("tbl_label", "tblA")],
                vec![(1, 1.0), (2, f64::NAN)],
            )],
        };

        let metrics = IngestMetrics::new_unregistered();
        let policy = BuilderPolicy { fail_on_invalid_sample: true, ..Default::default() };
        let err = build(request, &routing(), policy, &metrics).unwrap_err();
        assert!(matches!(err, RecordBuilderError::InvalidSampleValue { .. }));
    }

    #[test]
    fn s6_missing_routing_fails_whole_request() {
        let request = WriteRequest {
            timeseries: vec![series(vec![("__name__", "m")], vec![(1, 1.0)])],
        };

        let metrics = IngestMetrics::new_unregistered();
        let err = build(request, &routing(), BuilderPolicy::default(), &metrics).unwrap_err();
        assert!(matches!(err, RecordBuilderError::MissingDatabase));
    }

    #[test]
    fn empty_write_request_yields_empty_grouping() {
        let metrics = IngestMetrics::new_unregistered();
        let grouping = build(WriteRequest::default(), &routing(), BuilderPolicy::default(), &metrics).unwrap();
        assert!(grouping.is_empty());
    }

    #[test]
    fn metric_name_exactly_60_bytes_is_accepted() {
        let name = "a".repeat(60);
        let request = WriteRequest {
            timeseries: vec![series(
                vec![("__name__", &name), ("db_label", "dbA"), ("tbl_label", "tblA")],
                vec![(1, 1.0)],
            )],
        };
        let metrics = IngestMetrics::new_unregistered();
        let grouping = build(request, &routing(), BuilderPolicy::default(), &metrics).unwrap();
        assert_eq!(grouping["dbA"]["tblA"].len(), 1);
    }

    #[test]
    fn metric_name_61_bytes_dropped_when_fail_fast_off() {
        let name = "a".repeat(61);
        let request = WriteRequest {
            timeseries: vec![series(
                vec![("__name__", &name), ("db_label", "dbA"), ("tbl_label", "tblA")],
                vec![(1, 1.0)],
            )],
        };
        let metrics = IngestMetrics::new_unregistered();
        let grouping = build(request, &routing(), BuilderPolicy::default(), &metrics).unwrap();
        assert!(grouping.is_empty());
        assert_eq!(metrics.ignored_samples.get(), 1);
    }

    #[test]
    fn metric_name_61_bytes_errors_when_fail_fast_on() {
        let name = "a".repeat(61);
        let request = WriteRequest {
            timeseries: vec![series(
                vec![("__name__", &name), ("db_label", "dbA"), ("tbl_label", "tblA")],
                vec![(1, 1.0)],
            )],
        };
        let metrics = IngestMetrics::new_unregistered();
        let policy = BuilderPolicy { fail_on_long_label: true, ..Default::default() };
        let err = build(request, &routing(), policy, &metrics).unwrap_err();
        assert!(matches!(err, RecordBuilderError::LongLabelName { len: 61, .. }));
    }

    #[test]
    fn ensure_resolved_destination_rejects_empty_table() {
        let err = ensure_resolved_destination("dbA", "").unwrap_err();
        assert!(matches!(err, RecordBuilderError::Invariant(_)));
    }

    #[test]
    fn ensure_resolved_destination_accepts_non_empty_pair() {
        ensure_resolved_destination("dbA", "tblA").unwrap();
    }

    #[test]
    fn zero_valid_samples_omits_series_without_error() {
        let request = WriteRequest {
            timeseries: vec![series(
                vec![("__name__", "m"), ("db_label", "dbA"), ("tbl_label", "tblA")],
                vec![(1, f64::NAN), (2, f64::INFINITY)],
            )],
        };
        let metrics = IngestMetrics::new_unregistered();
        let grouping = build(request, &routing(), BuilderPolicy::default(), &metrics).unwrap();
        assert!(grouping.is_empty());
        assert_eq!(metrics.ignored_samples.get(), 2);
    }
}
