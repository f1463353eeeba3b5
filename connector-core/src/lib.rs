//! Translation engine between the Prometheus remote-storage wire protocol
//! and a TSDB's write/query RPCs (§1).
//!
//! This crate is the framing-agnostic core: record builder, query
//! compiler, result assembler, TSDB client facade, metrics surface, and
//! handler shell. `connector-server` wires it to an axum HTTP server; a
//! FaaS binary could wire [`handler::handle_envelope`] to its own runtime
//! without depending on anything else here.

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod model;
pub mod proto;
pub mod query_compiler;
pub mod record_builder;
pub mod result_assembler;
