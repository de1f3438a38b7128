//! Pulse Server Library
//!
//! Ingests daily merchant activity CSV files into PostgreSQL and serves five
//! precomputed analytics from memory.
//!
//! # Overview
//!
//! - **Ingestion**: streaming CSV import with per-row validation, idempotent
//!   batched writes, write retries and bounded file-level concurrency
//! - **Analytics**: five aggregation queries run concurrently once per process
//!   and cached behind a readiness gate
//! - **API**: read-only axum routes for import status and analytics
//!
//! # Startup
//!
//! ```no_run
//! use pulse_server::{
//!     accessor::Insights,
//!     analytics::AnalyticsCache,
//!     config::Config,
//!     db,
//!     ingest::{ImportTotals, IngestOrchestrator, ValidationStats},
//!     store::PgActivityStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pool = db::create_pool(&db::DbConfig::from(&config.database)).await?;
//!     db::run_migrations(&pool).await?;
//!
//!     let totals = Arc::new(ImportTotals::new());
//!     let cache = Arc::new(AnalyticsCache::new());
//!     let insights = Insights::new(totals.clone(), cache.clone());
//!
//!     IngestOrchestrator::new(
//!         Arc::new(PgActivityStore::new(pool)),
//!         totals,
//!         Arc::new(ValidationStats::new()),
//!         cache,
//!         config.ingest.clone(),
//!     )
//!     .start();
//!
//!     // serve `insights` ...
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod accessor;
pub mod analytics;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod middleware;
pub mod models;
pub mod store;

// Re-export commonly used types
pub use accessor::Insights;
pub use error::AppError;
