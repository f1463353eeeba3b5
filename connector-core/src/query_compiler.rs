//! Compiles Prometheus label-matcher queries into the TSDB's SQL dialect (§4.2).
//!
//! Adapted from `rohankumardubey-cnosdb`'s `build_sql_with_table` matcher
//! walk — partition matchers into routing / metric-name / other, emit one
//! SQL fragment per matcher, compose with a trailing time predicate — but
//! targeting this TSDB's dialect (`REGEXP_LIKE`/`NOT REGEXP_LIKE`,
//! `FROM_UNIXTIME(ms/1000)`) and this spec's routing model (routing labels
//! resolve *both* database and table, rather than cnosdb's single-database
//! multi-table model).

use crate::error::QueryCompilerError;
use crate::model::{MatcherType, Query};
use crate::record_builder::RoutingConfig;

/// The TSDB column holding the Prometheus metric name (§3's "measure name").
pub const MEASURE_NAME_COLUMN: &str = "measure_name";

/// One compiled SQL statement plus the destination it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    /// Destination database.
    pub database: String,
    /// Destination table.
    pub table: String,
    /// The composed SQL statement.
    pub sql: String,
}

/// Compiles every sub-query in `queries`, returning one [`CompiledQuery`]
/// per input plus whether any matcher used a regex type (RE/NRE) — the
/// caller uses this to annotate backend validation errors with the
/// "possibly an unsupported regex syntax" hint (§4.4).
///
/// # Errors
///
/// Returns `MissingDatabase`/`MissingTable` if a query resolves no
/// destination, or `UnknownMatcher` if a matcher's type is outside
/// {EQ, NEQ, RE, NRE} (surfaced upstream by [`crate::model::LabelMatcher`]
/// conversion, never constructed by this module itself).
pub fn compile(
    queries: &[Query],
    routing: &RoutingConfig,
) -> Result<(Vec<CompiledQuery>, bool), QueryCompilerError> {
    let mut compiled = Vec::with_capacity(queries.len());
    let mut has_regex = false;

    for query in queries {
        let (statement, query_has_regex) = compile_one(query, routing)?;
        has_regex |= query_has_regex;
        compiled.push(statement);
    }

    Ok((compiled, has_regex))
}

fn compile_one(query: &Query, routing: &RoutingConfig) -> Result<(CompiledQuery, bool), QueryCompilerError> {
    let mut database = routing.default_database.clone();
    let mut table = routing.default_table.clone();
    let mut fragments = Vec::with_capacity(query.matchers.len());
    let mut has_regex = false;

    for matcher in &query.matchers {
        if routing.database_label.as_deref() == Some(matcher.name.as_str())
            && matcher.matcher_type == MatcherType::Eq
        {
            database = matcher.value.clone();
            continue;
        }
        if routing.table_label.as_deref() == Some(matcher.name.as_str())
            && matcher.matcher_type == MatcherType::Eq
        {
            table = matcher.value.clone();
            continue;
        }

        let column = if matcher.name == "__name__" { MEASURE_NAME_COLUMN } else { matcher.name.as_str() };

        has_regex |= matches!(matcher.matcher_type, MatcherType::Re | MatcherType::Nre);
        fragments.push(matcher_fragment(column, matcher.value.as_str(), matcher.matcher_type));
    }

    if database.is_empty() {
        return Err(QueryCompilerError::MissingDatabase);
    }
    if table.is_empty() {
        return Err(QueryCompilerError::MissingTable);
    }

    fragments.push(time_predicate(query.start_ms, query.end_ms));

    let sql = format!("SELECT * FROM {database}.{table} WHERE {}", fragments.join(" AND "));

    Ok((CompiledQuery { database, table, sql }, has_regex))
}

/// Renders one matcher as a SQL boolean fragment.
///
/// Matcher values are embedded as single-quoted literals without escaping —
/// Prometheus label-value semantics restrict callers from sending untrusted
/// single quotes; this is a deliberately preserved open question (§9), not
/// an oversight.
fn matcher_fragment(column: &str, value: &str, matcher_type: MatcherType) -> String {
    match matcher_type {
        MatcherType::Eq => format!("{column} = '{value}'"),
        MatcherType::Neq => format!("{column} != '{value}'"),
        MatcherType::Re => format!("REGEXP_LIKE({column}, '{value}')"),
        MatcherType::Nre => format!("NOT REGEXP_LIKE({column}, '{value}')"),
    }
}

/// Renders the trailing time-range predicate. Millisecond-to-second integer
/// division loses sub-second precision by design (§9's "integer division
/// for timestamps" note) — preserved as specified, not a rounding bug.
fn time_predicate(start_ms: i64, end_ms: i64) -> String {
    format!("time BETWEEN FROM_UNIXTIME({}) AND FROM_UNIXTIME({})", start_ms / 1000, end_ms / 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LabelMatcher;

    fn routing() -> RoutingConfig {
        RoutingConfig {
            default_database: String::new(),
            default_table: String::new(),
            database_label: Some("db_label".to_string()),
            table_label: Some("tbl_label".to_string()),
        }
    }

    fn matcher(name: &str, value: &str, matcher_type: MatcherType) -> LabelMatcher {
        LabelMatcher { name: name.to_string(), value: value.to_string(), matcher_type }
    }

    #[test]
    fn s4_compiles_regex_query() {
        let query = Query {
            start_ms: 1_700_000_000_000,
            end_ms: 1_700_000_060_000,
            matchers: vec![
                matcher("__name__", "http_requests", MatcherType::Eq),
                matcher("job", "p.*", MatcherType::Re),
                matcher("code", "2..", MatcherType::Nre),
                matcher("db_label", "dbA", MatcherType::Eq),
                matcher("tbl_label", "tblA", MatcherType::Eq),
            ],
        };

        let (compiled, has_regex) = compile(std::slice::from_ref(&query), &routing()).unwrap();
        assert!(has_regex);
        assert_eq!(compiled.len(), 1);
        assert_eq!(
            compiled[0].sql,
            "SELECT * FROM dbA.tblA WHERE measure_name = 'http_requests' AND REGEXP_LIKE(job, 'p.*') \
             AND NOT REGEXP_LIKE(code, '2..') AND time BETWEEN FROM_UNIXTIME(1700000000) AND FROM_UNIXTIME(1700000060)"
        );
    }

    #[test]
    fn s7_routing_only_query_has_no_extra_fragments() {
        let query = Query {
            start_ms: 1000,
            end_ms: 2000,
            matchers: vec![matcher("db_label", "db", MatcherType::Eq), matcher("tbl_label", "tbl", MatcherType::Eq)],
        };

        let (compiled, has_regex) = compile(std::slice::from_ref(&query), &routing()).unwrap();
        assert!(!has_regex);
        assert_eq!(compiled[0].sql, "SELECT * FROM db.tbl WHERE time BETWEEN FROM_UNIXTIME(1) AND FROM_UNIXTIME(2)");
    }

    #[test]
    fn missing_table_when_only_database_resolved() {
        let query = Query {
            start_ms: 0,
            end_ms: 1,
            matchers: vec![matcher("db_label", "db", MatcherType::Eq)],
        };
        let err = compile(std::slice::from_ref(&query), &routing()).unwrap_err();
        assert!(matches!(err, QueryCompilerError::MissingTable));
    }

    #[test]
    fn missing_database_when_nothing_resolved() {
        let query = Query { start_ms: 0, end_ms: 1, matchers: vec![] };
        let err = compile(std::slice::from_ref(&query), &routing()).unwrap_err();
        assert!(matches!(err, QueryCompilerError::MissingDatabase));
    }

    #[test]
    fn non_routing_matchers_preserve_input_order() {
        let query = Query {
            start_ms: 0,
            end_ms: 1,
            matchers: vec![
                matcher("db_label", "db", MatcherType::Eq),
                matcher("tbl_label", "tbl", MatcherType::Eq),
                matcher("b", "2", MatcherType::Eq),
                matcher("a", "1", MatcherType::Eq),
            ],
        };
        let (compiled, _) = compile(std::slice::from_ref(&query), &routing()).unwrap();
        assert_eq!(
            compiled[0].sql,
            "SELECT * FROM db.tbl WHERE b = '2' AND a = '1' AND time BETWEEN FROM_UNIXTIME(0) AND FROM_UNIXTIME(0)"
        );
    }
}
