//! Metrics surface (§4.6): counters and histograms describing ingest and
//! query traffic, exposed at `/metrics` via [`prometheus::TextEncoder`].
//!
//! A single [`ConnectorMetrics`] is built once at startup and threaded
//! through the facade and handler layer (no global/lazy-static registry,
//! per §9's "no process-wide singletons" decision) — cloning it is cheap
//! since every field is an `Arc`-backed `prometheus` handle.

use prometheus::{Counter, Histogram, HistogramOpts, Opts, Registry};

/// Counters incremented by the record builder while grouping a `WriteRequest`.
#[derive(Debug, Clone)]
pub struct IngestMetrics {
    /// Total samples offered to ingest, across all series.
    pub received_samples: Counter,
    /// Total samples dropped by policy: long label, non-finite value, or a
    /// series left with zero valid samples after filtering.
    pub ignored_samples: Counter,
}

impl IngestMetrics {
    fn new() -> prometheus::Result<Self> {
        Ok(Self {
            received_samples: Counter::with_opts(Opts::new(
                "timestream_connector_received_samples_total",
                "Count of all samples offered to ingest.",
            ))?,
            ignored_samples: Counter::with_opts(Opts::new(
                "timestream_connector_ignored_samples_total",
                "Count of samples dropped by policy (long label, non-finite, or zero valid samples).",
            ))?,
        })
    }

    /// Builds a standalone instance not registered to any [`Registry`].
    ///
    /// Used by record-builder unit tests that only care about the counter
    /// values, not scrape exposition.
    #[must_use]
    pub fn new_unregistered() -> Self {
        Self::new().expect("metric options are static and always valid")
    }
}

/// The full metrics surface exposed at the telemetry endpoint (§4.6).
#[derive(Debug, Clone)]
pub struct ConnectorMetrics {
    /// Ingest counters, shared with the record builder.
    pub ingest: IngestMetrics,
    /// Count of `/write` requests handled.
    pub write_requests: Counter,
    /// Wall-clock duration of each `/write` request, in seconds.
    pub write_duration: Histogram,
    /// Count of `/read` requests handled.
    pub read_requests: Counter,
    /// Wall-clock duration of each `/read` request, in seconds.
    pub read_duration: Histogram,
}

impl ConnectorMetrics {
    /// Builds a fresh metrics surface and registers every series with `registry`.
    ///
    /// # Errors
    ///
    /// Returns a `prometheus::Error` if a metric name collides with one
    /// already registered (should not happen with a dedicated `Registry`
    /// built in `main`).
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let ingest = IngestMetrics::new()?;
        let write_requests = Counter::with_opts(Opts::new(
            "timestream_connector_write_requests_total",
            "Count of /write requests handled.",
        ))?;
        let write_duration = Histogram::with_opts(HistogramOpts::new(
            "timestream_connector_write_duration_seconds",
            "Wall-clock duration of each /write request.",
        ))?;
        let read_requests = Counter::with_opts(Opts::new(
            "timestream_connector_read_requests_total",
            "Count of /read requests handled.",
        ))?;
        let read_duration = Histogram::with_opts(HistogramOpts::new(
            "timestream_connector_read_duration_seconds",
            "Wall-clock duration of each /read request.",
        ))?;

        registry.register(Box::new(ingest.received_samples.clone()))?;
        registry.register(Box::new(ingest.ignored_samples.clone()))?;
        registry.register(Box::new(write_requests.clone()))?;
        registry.register(Box::new(write_duration.clone()))?;
        registry.register(Box::new(read_requests.clone()))?;
        registry.register(Box::new(read_duration.clone()))?;

        Ok(Self { ingest, write_requests, write_duration, read_requests, read_duration })
    }

    /// Renders the current state of every series in `registry` as the
    /// Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns a `prometheus::Error` if encoding fails (e.g. a non-UTF-8
    /// metric label, which cannot occur with this module's fixed metric set).
    pub fn render(registry: &Registry) -> prometheus::Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
