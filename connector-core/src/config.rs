//! Recognized configuration options (§6), parsed with precedence CLI flag
//! > environment variable > default via `clap`'s `env` feature — the same
//! derive style as `rondo-cli::Cli`, flattened into one struct instead of a
//! subcommand enum since this binary has a single mode (serve).

use clap::Parser;

use crate::record_builder::{BuilderPolicy, RoutingConfig};

/// Every option in §6's table, with environment-variable fallbacks under
/// the `CONNECTOR_` prefix.
#[derive(Parser, Debug, Clone)]
#[command(name = "connector-server", version, about)]
pub struct Config {
    /// Fallback database for ingestion and query when routing labels are absent.
    #[arg(long = "default-database", env = "CONNECTOR_DEFAULT_DATABASE", default_value = "")]
    pub default_database: String,

    /// Fallback table, as above.
    #[arg(long = "default-table", env = "CONNECTOR_DEFAULT_TABLE", default_value = "")]
    pub default_table: String,

    /// Name of the routing label for per-series database override.
    #[arg(long = "database-label", env = "CONNECTOR_DATABASE_LABEL")]
    pub database_label: Option<String>,

    /// Name of the routing label for per-series table override.
    #[arg(long = "table-label", env = "CONNECTOR_TABLE_LABEL")]
    pub table_label: Option<String>,

    /// Error if any label/metric name exceeds 60 bytes; otherwise drop the series.
    #[arg(long = "fail-on-long-label", env = "CONNECTOR_FAIL_ON_LONG_LABEL", default_value_t = false)]
    pub fail_on_long_label: bool,

    /// Error on NaN/±Inf samples; otherwise drop the sample.
    #[arg(
        long = "fail-on-invalid-sample-value",
        env = "CONNECTOR_FAIL_ON_INVALID_SAMPLE_VALUE",
        default_value_t = false
    )]
    pub fail_on_invalid_sample_value: bool,

    /// Backend-client retry attempts for read RPCs.
    #[arg(long = "max-retries", env = "CONNECTOR_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    /// Backend service region.
    #[arg(long = "region", env = "CONNECTOR_REGION", default_value = "us-east-1")]
    pub region: String,

    /// HTTP bind address.
    #[arg(long = "web.listen-address", env = "CONNECTOR_WEB_LISTEN_ADDRESS", default_value = ":9201")]
    pub web_listen_address: String,

    /// Metrics endpoint path.
    #[arg(long = "web.telemetry-path", env = "CONNECTOR_WEB_TELEMETRY_PATH", default_value = "/metrics")]
    pub web_telemetry_path: String,

    /// Path to a TLS certificate. Enables TLS when set together with `tls_key`.
    #[arg(long = "tls-certificate", env = "CONNECTOR_TLS_CERTIFICATE")]
    pub tls_certificate: Option<String>,

    /// Path to a TLS private key. Enables TLS when set together with `tls_certificate`.
    #[arg(long = "tls-key", env = "CONNECTOR_TLS_KEY")]
    pub tls_key: Option<String>,

    /// Override the query RPC base URL (private-network deployments).
    #[arg(long = "query-base-endpoint", env = "CONNECTOR_QUERY_BASE_ENDPOINT", default_value = "")]
    pub query_base_endpoint: String,

    /// Override the write RPC base URL (private-network deployments).
    #[arg(long = "write-base-endpoint", env = "CONNECTOR_WRITE_BASE_ENDPOINT", default_value = "")]
    pub write_base_endpoint: String,
}

impl Config {
    /// Extracts the routing configuration this config implies.
    #[must_use]
    pub fn routing(&self) -> RoutingConfig {
        RoutingConfig {
            default_database: self.default_database.clone(),
            default_table: self.default_table.clone(),
            database_label: self.database_label.clone(),
            table_label: self.table_label.clone(),
        }
    }

    /// Extracts the record-builder policy this config implies.
    #[must_use]
    pub fn builder_policy(&self) -> BuilderPolicy {
        BuilderPolicy {
            fail_on_long_label: self.fail_on_long_label,
            fail_on_invalid_sample: self.fail_on_invalid_sample_value,
        }
    }

    /// True when both TLS options are set and the server should terminate TLS itself.
    #[must_use]
    pub fn tls_enabled(&self) -> bool {
        self.tls_certificate.is_some() && self.tls_key.is_some()
    }
}
