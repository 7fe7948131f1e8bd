//! # Leakscan Core
//!
//! Core library for leakscan, a sensitive-data scanner for bucket-like object
//! stores.
//!
//! ## Overview
//!
//! `leakscan-core` provides every moving part of the scan pipeline:
//!
//! - **Detection Engine**: pure multi-pattern scanning with masking and
//!   context extraction ([`detect`])
//! - **Object Ledger & Finding Store**: idempotent, keyed persistence of scan
//!   progress and redacted findings ([`persistence`])
//! - **Job Orchestrator**: job creation, object enumeration, and work fan-out
//!   ([`orchestrate`])
//! - **Scan Worker**: the at-least-once queue consumer that turns object
//!   content into findings ([`worker`])
//! - **Ports**: the object store and work queue boundaries with filesystem,
//!   Postgres, and in-memory backends ([`store`], [`queue`])
//!
//! All coordination between concurrent workers happens through the relational
//! store's uniqueness constraints and keyed updates; there is no shared
//! in-memory state.

/// Detection engine: detectors, masking, and context snippets
pub mod detect;
/// Crate error type and result alias
pub mod error;
/// Job orchestration: enumeration, seeding, and work publishing
pub mod orchestrate;
/// Repository ports and backends for jobs, the object ledger, and findings
pub mod persistence;
/// Work queue port and backends
pub mod queue;
/// Object store port and backends
pub mod store;
/// Core domain types
pub mod types;
/// Scan worker loop
pub mod worker;

pub use detect::{Detection, DetectionEngine, Detector};
pub use error::{Result, ScanError};
pub use orchestrate::JobOrchestrator;
pub use types::{
    FindingRecord, JobId, ObjectEntry, ObjectRecord, ObjectStatus, ScanJob,
    WorkItem,
};
pub use worker::ScanWorker;
