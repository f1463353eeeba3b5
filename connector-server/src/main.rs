//! Entry point: parse config, build the TSDB client facade, bind a socket
//! (plain or TLS), and serve [`connector_server::router`] — as
//! `rondo-cli::main` parsed its CLI, built a store, and dispatched to a
//! subcommand, propagating a nonzero exit code on failure.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use connector_core::client::{Facade, HttpTsdbTransport};
use connector_core::config::Config;
use connector_core::metrics::ConnectorMetrics;
use connector_server::AppState;
use prometheus::Registry;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let registry = Registry::new();
    let metrics = ConnectorMetrics::new(&registry).expect("metric names are static and collision-free");

    let transport = Arc::new(HttpTsdbTransport::new(
        config.write_base_endpoint.clone(),
        config.query_base_endpoint.clone(),
        config.max_retries,
    ));
    let facade = Facade::new(transport, metrics, config.routing(), config.builder_policy());

    let state = Arc::new(AppState { facade, registry });
    let app = connector_server::router(state, &config.web_telemetry_path);

    let addr = parse_listen_address(&config.web_listen_address);

    if config.tls_enabled() {
        let tls_certificate = config.tls_certificate.as_deref().expect("checked by tls_enabled");
        let tls_key = config.tls_key.as_deref().expect("checked by tls_enabled");
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(tls_certificate, tls_key)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "failed to load TLS certificate/key");
                std::process::exit(1);
            });

        tracing::info!(%addr, "listening (TLS)");
        axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "server exited with an error");
            std::process::exit(1);
        });
    } else {
        tracing::info!(%addr, "listening");
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap_or_else(|e| {
            tracing::error!(error = %e, %addr, "failed to bind");
            std::process::exit(1);
        });
        axum::serve(listener, app.into_make_service()).await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "server exited with an error");
            std::process::exit(1);
        });
    }
}

/// Accepts node_exporter-style `":9201"` shorthand (bind all interfaces) as
/// well as a fully qualified `host:port`.
fn parse_listen_address(raw: &str) -> SocketAddr {
    let candidate = if let Some(port) = raw.strip_prefix(':') { format!("0.0.0.0:{port}") } else { raw.to_string() };
    candidate.parse().unwrap_or_else(|e| {
        tracing::error!(error = %e, address = %raw, "invalid --web.listen-address");
        std::process::exit(1);
    })
}
