//! HTTP surface and worker runtime for leakscan.
//!
//! The binary wires Postgres-backed persistence and queueing, a filesystem
//! object store, the detection engine, and a pool of in-process scan workers
//! behind a small Axum API: submit a scan, poll its progress, page through
//! masked findings.

pub mod errors;
pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;
pub use infra::config::Config;
