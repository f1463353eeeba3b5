//! TSDB client facade (§4.4): owns the backend transport, issues the two
//! RPCs, observes metrics, and maps backend errors to [`ConnectorError`].
//!
//! `TsdbTransport` is this design's rendering of §9's "client-factory"
//! design note: production wires a [`HttpTsdbTransport`], tests wire a
//! [`FakeTransport`]. Adapted from `rondo::remote_write`'s
//! `RemoteWriteConfig`/`push`/`send_with_retry` (config-with-builder-methods,
//! retry-with-backoff loop) — ported from a single blocking push to an async
//! trait covering both write and paginated read RPCs, and from write-path
//! retry to read-path retry per §6's `max-retries`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::{ClientError, ConnectorError};
use crate::metrics::ConnectorMetrics;
use crate::model::{Grouping, Page, Record, ReadRequest, TimeSeries, WriteRequest};
use crate::query_compiler::{self, CompiledQuery};
use crate::record_builder::{self, BuilderPolicy, RoutingConfig};
use crate::result_assembler::Assembler;

/// Basic-auth credentials extracted from a single request, forwarded to the
/// backend on every RPC the facade issues for that request. Never cached
/// across requests (§4.4).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Basic-auth username.
    pub username: String,
    /// Basic-auth password.
    pub password: String,
}

/// Statistics returned by a successful write call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// Total records submitted across every (database, table) batch.
    pub records_written: usize,
}

/// Pulls successive pages from a single compiled query's backend cursor.
///
/// Object-safe so `TsdbTransport::query` can return `Box<dyn Paginator>`
/// regardless of the concrete backend SDK's cursor type.
#[async_trait]
pub trait Paginator: Send {
    /// Fetches the next page, or `None` once the cursor is exhausted.
    async fn next_page(&mut self) -> Result<Option<Page>, ClientError>;
}

/// The backend transport port: "write records to (database, table)" and
/// "run SQL with paginated results" (§1's two RPCs).
#[async_trait]
pub trait TsdbTransport: Send + Sync {
    /// Writes a batch of records to one (database, table) destination.
    async fn write_records(
        &self,
        database: &str,
        table: &str,
        records: Vec<Record>,
        credentials: &Credentials,
    ) -> Result<(), ClientError>;

    /// Begins a paginated query, returning a cursor over result pages.
    async fn query(&self, sql: &str, credentials: &Credentials) -> Result<Box<dyn Paginator>, ClientError>;
}

/// The facade's observable lifecycle state (§4.4's three-state machine).
///
/// "Unconfigured" has no runtime representation here: a `Facade` cannot be
/// observed before `Facade::new` returns, so the only states a caller can
/// ever act on are `Ready` and `ShuttingDown`.
#[derive(Debug)]
struct LifecycleState {
    shutting_down: AtomicBool,
}

/// Owns a backend transport and the configuration needed to drive the
/// builder/compiler/assembler pipeline end to end.
pub struct Facade {
    transport: Arc<dyn TsdbTransport>,
    metrics: ConnectorMetrics,
    routing: RoutingConfig,
    policy: BuilderPolicy,
    state: LifecycleState,
}

impl Facade {
    /// Builds a facade in the `Ready` state.
    #[must_use]
    pub fn new(
        transport: Arc<dyn TsdbTransport>,
        metrics: ConnectorMetrics,
        routing: RoutingConfig,
        policy: BuilderPolicy,
    ) -> Self {
        Self { transport, metrics, routing, policy, state: LifecycleState { shutting_down: AtomicBool::new(false) } }
    }

    /// Transitions the facade to `ShuttingDown`. Operations started after
    /// this call fail fast with `ClientError::NotReady`.
    pub fn begin_shutdown(&self) {
        self.state.shutting_down.store(true, Ordering::SeqCst);
    }

    fn ensure_ready(&self) -> Result<(), ClientError> {
        if self.state.shutting_down.load(Ordering::SeqCst) {
            return Err(ClientError::NotReady("client is shutting down"));
        }
        Ok(())
    }

    /// Builds records from `request`, then issues one write RPC per
    /// (database, table) destination. Every destination is attempted even
    /// if an earlier one fails; the first failure encountered is returned
    /// (§4.4's "first error wins, all calls attempted" policy).
    ///
    /// # Errors
    ///
    /// Returns the record builder's error, or the first `ClientError`
    /// encountered while writing.
    pub async fn write(&self, request: WriteRequest, credentials: &Credentials) -> Result<WriteStats, ConnectorError> {
        self.ensure_ready()?;

        let started = Instant::now();
        let result = self.write_inner(request, credentials).await;

        self.metrics.write_requests.inc();
        self.metrics.write_duration.observe(started.elapsed().as_secs_f64());

        result
    }

    async fn write_inner(&self, request: WriteRequest, credentials: &Credentials) -> Result<WriteStats, ConnectorError> {
        let grouping = record_builder::build(request, &self.routing, self.policy, &self.metrics.ingest)?;
        Ok(self.write_grouping(grouping, credentials).await?)
    }

    async fn write_grouping(&self, grouping: Grouping, credentials: &Credentials) -> Result<WriteStats, ClientError> {
        let mut first_error = None;
        let mut records_written = 0;

        for (database, tables) in grouping {
            for (table, records) in tables {
                let count = records.len();
                match self.transport.write_records(&database, &table, records, credentials).await {
                    Ok(()) => records_written += count,
                    Err(e) if first_error.is_none() => first_error = Some(e),
                    Err(_) => {}
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(WriteStats { records_written }),
        }
    }

    /// Compiles every sub-query, executes it with paginated iteration, and
    /// reassembles the result into a Prometheus read response. Unlike
    /// `write`, any pagination error terminates the whole read
    /// immediately — partial read results are never returned as success.
    ///
    /// # Errors
    ///
    /// Returns the query compiler's error, or the first `ClientError`
    /// encountered while paginating; backend validation errors are
    /// annotated with a regex hint when the offending sub-query used a
    /// regex matcher (§4.4).
    pub async fn read(
        &self,
        request: ReadRequest,
        credentials: &Credentials,
    ) -> Result<Vec<Vec<TimeSeries>>, ConnectorError> {
        self.ensure_ready()?;

        let started = Instant::now();
        let result = self.read_inner(request, credentials).await;

        self.metrics.read_requests.inc();
        self.metrics.read_duration.observe(started.elapsed().as_secs_f64());

        result
    }

    async fn read_inner(
        &self,
        request: ReadRequest,
        credentials: &Credentials,
    ) -> Result<Vec<Vec<TimeSeries>>, ConnectorError> {
        let (compiled, has_regex) = query_compiler::compile(&request.queries, &self.routing)?;

        let mut results = Vec::with_capacity(compiled.len());
        for query in &compiled {
            let series = self.run_one_query(query, credentials, has_regex).await?;
            results.push(series);
        }

        Ok(results)
    }

    async fn run_one_query(
        &self,
        query: &CompiledQuery,
        credentials: &Credentials,
        has_regex: bool,
    ) -> Result<Vec<TimeSeries>, ConnectorError> {
        let mut paginator =
            self.transport.query(&query.sql, credentials).await.map_err(|e| annotate_regex(e, has_regex))?;

        let mut assembler = Assembler::new();
        while let Some(page) = paginator.next_page().await.map_err(|e| annotate_regex(e, has_regex))? {
            assembler.ingest_page(&page)?;
        }

        Ok(assembler.finish())
    }
}

/// Re-tags a backend validation error with whether the originating query
/// used a regex matcher, so its `Display` carries the "possibly an
/// unsupported regex syntax" hint (§4.4).
fn annotate_regex(error: ClientError, has_regex: bool) -> ClientError {
    match error {
        ClientError::Backend { status, body, .. } => ClientError::Backend { status, body, regex_matchers: has_regex },
        other => other,
    }
}

/// Production transport: issues the two backend RPCs over `reqwest`
/// against configured base endpoints, retrying read RPCs with exponential
/// backoff (`rondo::remote_write::send_with_retry`'s shape, bounded by
/// `max_retries`).
#[derive(Debug, Clone)]
pub struct HttpTsdbTransport {
    client: reqwest::Client,
    write_base_endpoint: String,
    query_base_endpoint: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl HttpTsdbTransport {
    /// Builds a transport against the given base endpoints.
    #[must_use]
    pub fn new(write_base_endpoint: String, query_base_endpoint: String, max_retries: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            write_base_endpoint,
            query_base_endpoint,
            max_retries,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

#[async_trait]
impl TsdbTransport for HttpTsdbTransport {
    async fn write_records(
        &self,
        database: &str,
        table: &str,
        records: Vec<Record>,
        credentials: &Credentials,
    ) -> Result<(), ClientError> {
        let body = serde_json::json!({ "database": database, "table": table, "records": records_to_json(&records) });

        let response = self
            .client
            .post(format!("{}/WriteRecords", self.write_base_endpoint))
            .basic_auth(&credentials.username, Some(&credentials.password))
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        Err(ClientError::Backend { status, body: text, regex_matchers: false })
    }

    async fn query(&self, sql: &str, credentials: &Credentials) -> Result<Box<dyn Paginator>, ClientError> {
        let mut backoff = self.retry_backoff;
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match self.start_query(sql, credentials).await {
                Ok(paginator) => return Ok(paginator),
                Err(e @ ClientError::Backend { status, .. }) if (400..500).contains(&status) => return Err(e),
                Err(e) => last_error = Some(e),
            }

            if attempt < self.max_retries {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }

        Err(last_error.expect("at least one attempt was made"))
    }
}

impl HttpTsdbTransport {
    async fn start_query(&self, sql: &str, credentials: &Credentials) -> Result<Box<dyn Paginator>, ClientError> {
        let response = self
            .client
            .post(format!("{}/Query", self.query_base_endpoint))
            .basic_auth(&credentials.username, Some(&credentials.password))
            .json(&serde_json::json!({ "query_string": sql }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::Backend { status, body: text, regex_matchers: false });
        }

        let page: Page = response.json::<HttpPage>().await.map_err(ClientError::Transport)?.into();
        Ok(Box::new(HttpPaginator { first_page: Some(page) }))
    }
}

/// A single-page paginator: the backend's paginated-query wire response
/// for this transport is returned in full on the first call. Backends that
/// page server-side can implement their own `Paginator`; this is the
/// shipped HTTP transport's rendering of "paginated" for a backend whose
/// SDK already returns complete result sets.
struct HttpPaginator {
    first_page: Option<Page>,
}

#[async_trait]
impl Paginator for HttpPaginator {
    async fn next_page(&mut self) -> Result<Option<Page>, ClientError> {
        Ok(self.first_page.take())
    }
}

#[derive(serde::Deserialize)]
struct HttpPage {
    columns: Vec<HttpColumn>,
    rows: Vec<Vec<Option<String>>>,
}

#[derive(serde::Deserialize)]
struct HttpColumn {
    name: String,
    role: String,
}

impl From<HttpPage> for Page {
    fn from(page: HttpPage) -> Self {
        use crate::model::{ColumnInfo, ColumnRole, Row};

        let columns = page
            .columns
            .into_iter()
            .map(|c| {
                let role = match c.role.as_str() {
                    "time" => ColumnRole::Time,
                    "measure_value" => ColumnRole::MeasureValue,
                    "measure_name" => ColumnRole::MeasureName,
                    _ => ColumnRole::Dimension,
                };
                ColumnInfo { name: c.name, role }
            })
            .collect();

        Page { columns, rows: page.rows.into_iter().map(|values| Row { values }).collect() }
    }
}

fn records_to_json(records: &[Record]) -> Vec<serde_json::Value> {
    records
        .iter()
        .map(|r| {
            serde_json::json!({
                "dimensions": r.dimensions.iter().map(|d| serde_json::json!({"name": d.name, "value": d.value})).collect::<Vec<_>>(),
                "measure_name": r.measure_name,
                "measure_value": r.measure_value,
                "measure_value_type": r.measure_value_type,
                "time": r.time,
                "time_unit": r.time_unit,
            })
        })
        .collect()
}

/// In-memory test transport: writes land in a `BTreeMap`, queries return a
/// pre-scripted page sequence regardless of the SQL text. Grounded on
/// rondo's habit of testing against a real `Store` opened in a tempdir
/// rather than a call-counting mock — here, a working in-memory backend.
#[derive(Default)]
pub struct FakeTransport {
    writes: std::sync::Mutex<BTreeMap<(String, String), Vec<Record>>>,
    scripted_pages: std::sync::Mutex<Vec<Page>>,
    fail_with: std::sync::Mutex<Option<ClientError>>,
}

impl FakeTransport {
    /// Builds an empty fake transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules the pages returned by the next `query` call, in order.
    pub fn script_pages(&self, pages: Vec<Page>) {
        *self.scripted_pages.lock().unwrap() = pages;
    }

    /// Makes every subsequent RPC fail with `error` (cloned via `Display`
    /// reconstruction, since `ClientError` isn't `Clone`).
    pub fn fail_with(&self, status: u16, body: impl Into<String>) {
        *self.fail_with.lock().unwrap() = Some(ClientError::Backend { status, body: body.into(), regex_matchers: false });
    }

    /// Returns the records written to `(database, table)`, if any.
    #[must_use]
    pub fn written_records(&self, database: &str, table: &str) -> Option<Vec<Record>> {
        self.writes.lock().unwrap().get(&(database.to_string(), table.to_string())).cloned()
    }
}

#[async_trait]
impl TsdbTransport for FakeTransport {
    async fn write_records(
        &self,
        database: &str,
        table: &str,
        records: Vec<Record>,
        _credentials: &Credentials,
    ) -> Result<(), ClientError> {
        if let Some(ClientError::Backend { status, body, regex_matchers }) = &*self.fail_with.lock().unwrap() {
            return Err(ClientError::Backend { status: *status, body: body.clone(), regex_matchers: *regex_matchers });
        }
        self.writes.lock().unwrap().entry((database.to_string(), table.to_string())).or_default().extend(records);
        Ok(())
    }

    async fn query(&self, _sql: &str, _credentials: &Credentials) -> Result<Box<dyn Paginator>, ClientError> {
        if let Some(ClientError::Backend { status, body, regex_matchers }) = &*self.fail_with.lock().unwrap() {
            return Err(ClientError::Backend { status: *status, body: body.clone(), regex_matchers: *regex_matchers });
        }
        let pages = std::mem::take(&mut *self.scripted_pages.lock().unwrap());
        Ok(Box::new(ScriptedPaginator { pages: pages.into_iter() }))
    }
}

struct ScriptedPaginator {
    pages: std::vec::IntoIter<Page>,
}

#[async_trait]
impl Paginator for ScriptedPaginator {
    async fn next_page(&mut self) -> Result<Option<Page>, ClientError> {
        Ok(self.pages.next())
    }
}
