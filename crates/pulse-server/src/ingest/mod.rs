//! Activity ingestion
//!
//! # Architecture
//!
//! - **validator**: per-row validation and sanitization, shared counters
//! - **importer**: streams one CSV file into the store in bounded batches
//! - **retry**: retry policy wrapped around every batch write
//! - **indexes**: drops and restores secondary indexes around a bulk load
//! - **scheduler**: file discovery and chunked file-level concurrency
//! - **counters**: run totals readable while the import is in flight
//! - **orchestrator**: startup sequence (restart shortcut, import, precompute)
//! - **config**: `INGEST_*` environment configuration

pub mod config;
pub mod counters;
pub mod importer;
pub mod indexes;
pub mod orchestrator;
pub mod retry;
pub mod scheduler;
pub mod validator;

pub use config::IngestConfig;
pub use counters::ImportTotals;
pub use importer::{FileImportStats, ImportError, StreamingImporter};
pub use indexes::{IndexCoordinator, ACTIVITY_INDEXES};
pub use orchestrator::{watch_startup, ImportOutcome, IngestOrchestrator, StartupOutcome};
pub use retry::RetryPolicy;
pub use scheduler::{discover_files, ConcurrencyScheduler, RunReport};
pub use validator::{RowValidator, SkipReason, ValidationSnapshot, ValidationStats, ValidationWarning};
