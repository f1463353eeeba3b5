//! Reassembles paginated TSDB rows into Prometheus time series (§4.3).
//!
//! Column-classification walk is adapted from `rohankumardubey-cnosdb`'s
//! `transform_time_series`/`WriterBuilder` (route each column by role —
//! tag, sample value, sample time — while walking a batch). The
//! incremental per-page accumulation and exact-label-set merge-or-append
//! rule are new logic, written in rondo's plain-struct-plus-free-function
//! style rather than cnosdb's `HashMap`-keyed-by-tag-values writer, since
//! the merge key here is the full label set rather than a known fixed tag
//! schema.

use chrono::NaiveDateTime;

use crate::error::ResultAssemblerError;
use crate::model::{ColumnInfo, ColumnRole, Label, Page, Sample, TimeSeries};

/// The TSDB's timestamp format for its time column (§4.3).
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Accumulates pages of TSDB rows into a merged set of time series.
///
/// One `Assembler` is built per sub-query; pages are fed to it in arrival
/// order via [`Assembler::ingest_page`], and [`Assembler::finish`] yields
/// the sub-query's `QueryResult`.
#[derive(Debug, Default)]
pub struct Assembler {
    series: Vec<TimeSeries>,
}

impl Assembler {
    /// Builds an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one page's rows into the accumulated series set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTime` if a time-column value doesn't match the
    /// backend's timestamp format, or `InvalidValue` if a measure-value
    /// column doesn't parse as a 64-bit float.
    pub fn ingest_page(&mut self, page: &Page) -> Result<(), ResultAssemblerError> {
        for row in &page.rows {
            self.ingest_row(&page.columns, row)?;
        }
        Ok(())
    }

    fn ingest_row(&mut self, columns: &[ColumnInfo], row: &crate::model::Row) -> Result<(), ResultAssemblerError> {
        let mut labels = Vec::with_capacity(columns.len());
        let mut timestamp_ms = None;
        let mut value = None;

        for (column, data) in columns.iter().zip(&row.values) {
            let Some(data) = data else { continue };

            match column.role {
                ColumnRole::Time => {
                    timestamp_ms = Some(parse_time(data)?);
                }
                ColumnRole::MeasureValue => {
                    let parsed: f64 =
                        data.parse().map_err(|_| ResultAssemblerError::InvalidValue(data.clone()))?;
                    value = Some(parsed);
                }
                ColumnRole::MeasureName => {
                    labels.push(Label { name: "__name__".to_string(), value: data.clone() });
                }
                ColumnRole::Dimension => {
                    labels.push(Label { name: column.name.clone(), value: data.clone() });
                }
            }
        }

        let (Some(timestamp_ms), Some(value)) = (timestamp_ms, value) else {
            return Ok(());
        };
        let sample = Sample { timestamp_ms, value };

        if let Some(existing) = self.series.iter_mut().find(|s| labels_match(&s.labels, &labels)) {
            existing.samples.push(sample);
        } else {
            self.series.push(TimeSeries { labels, samples: vec![sample] });
        }

        Ok(())
    }

    /// Consumes the assembler, returning the merged series set for this
    /// sub-query's `QueryResult`.
    #[must_use]
    pub fn finish(self) -> Vec<TimeSeries> {
        self.series
    }
}

/// True if two label sets contain the same (name, value) pairs, ignoring order.
fn labels_match(a: &[Label], b: &[Label]) -> bool {
    a.len() == b.len() && a.iter().all(|l| b.contains(l))
}

fn parse_time(value: &str) -> Result<i64, ResultAssemblerError> {
    let parsed = NaiveDateTime::parse_from_str(value, TIME_FORMAT)
        .map_err(|_| ResultAssemblerError::InvalidTime(value.to_string()))?;
    Ok(parsed.and_utc().timestamp_millis())
}
