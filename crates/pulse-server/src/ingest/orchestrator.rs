//! Startup orchestration
//!
//! Runs once per process in a background task:
//! 1. If the store already holds rows, skip ingestion (restart shortcut)
//! 2. Otherwise drop secondary indexes, import every file, restore indexes
//! 3. Precompute analytics over whatever was committed
//!
//! A failed import is logged and leaves the import incomplete; analytics are
//! still computed so the service becomes readable.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::IngestConfig;
use super::counters::ImportTotals;
use super::importer::StreamingImporter;
use super::indexes::IndexCoordinator;
use super::scheduler::{discover_files, ConcurrencyScheduler, RunReport};
use super::validator::{RowValidator, ValidationStats};
use crate::analytics::precompute::DEFAULT_SLOW_QUERY_THRESHOLD;
use crate::analytics::{AnalyticsCache, AnalyticsPrecomputer, PrecomputeReport};
use crate::store::ActivityStore;

/// How the import phase ended
#[derive(Debug)]
pub enum ImportOutcome {
    /// The store already held this many rows; nothing was read
    AlreadyPopulated(i64),
    Completed(RunReport),
    Failed(String),
}

#[derive(Debug)]
pub struct StartupOutcome {
    pub import: ImportOutcome,
    pub precompute: PrecomputeReport,
}

pub struct IngestOrchestrator {
    store: Arc<dyn ActivityStore>,
    totals: Arc<ImportTotals>,
    stats: Arc<ValidationStats>,
    cache: Arc<AnalyticsCache>,
    config: IngestConfig,
    slow_query_threshold: Duration,
}

impl IngestOrchestrator {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        totals: Arc<ImportTotals>,
        stats: Arc<ValidationStats>,
        cache: Arc<AnalyticsCache>,
        config: IngestConfig,
    ) -> Self {
        Self {
            store,
            totals,
            stats,
            cache,
            config,
            slow_query_threshold: DEFAULT_SLOW_QUERY_THRESHOLD,
        }
    }

    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    /// Start the orchestrator in background
    pub fn start(self) -> JoinHandle<StartupOutcome> {
        tokio::spawn(async move {
            info!("Startup orchestrator started");
            let outcome = self.run_startup().await;
            info!("Startup orchestrator finished");
            outcome
        })
    }

    /// Import (unless the store is already populated), then precompute
    pub async fn run_startup(&self) -> StartupOutcome {
        let import = self.run_import().await;

        let precompute = AnalyticsPrecomputer::new(self.store.clone(), self.cache.clone())
            .with_slow_threshold(self.slow_query_threshold)
            .run()
            .await;

        StartupOutcome { import, precompute }
    }

    async fn run_import(&self) -> ImportOutcome {
        match self.store.count().await {
            Ok(existing) if existing > 0 => {
                info!(existing, "Store already populated, skipping ingestion");
                self.totals.mark_complete();
                return ImportOutcome::AlreadyPopulated(existing);
            },
            Ok(_) => {},
            Err(e) => {
                error!(error = %e, "Failed to count stored activities, skipping ingestion");
                return ImportOutcome::Failed(e.to_string());
            },
        }

        match self.import_all().await {
            Ok(report) => {
                self.totals.mark_complete();
                info!(
                    files = report.files.len(),
                    imported = report.imported(),
                    skipped = report.skipped(),
                    elapsed_secs = report.elapsed.as_secs_f64(),
                    validation = ?self.stats.snapshot(),
                    "Import complete"
                );
                info!("{}", report.summary());
                ImportOutcome::Completed(report)
            },
            Err(e) => {
                error!(
                    error = %format!("{:#}", e),
                    imported = self.totals.imported(),
                    skipped = self.totals.skipped(),
                    validation = ?self.stats.snapshot(),
                    "Import failed; committed batches are kept"
                );
                ImportOutcome::Failed(format!("{:#}", e))
            },
        }
    }

    async fn import_all(&self) -> Result<RunReport> {
        let files = discover_files(&self.config.data_dir).await?;
        if files.is_empty() {
            warn!(dir = %self.config.data_dir.display(), "No activity files found");
        }

        let validator = RowValidator::new(self.stats.clone(), self.config.expected_year);
        let importer = StreamingImporter::new(
            self.store.clone(),
            validator,
            self.config.retry_policy(),
            self.config.batch_size,
        );
        let scheduler = ConcurrencyScheduler::new(
            Arc::new(importer),
            self.totals.clone(),
            self.config.file_concurrency,
        );

        let coordinator = IndexCoordinator::new(self.store.as_ref());
        if let Err(e) = coordinator.suspend().await {
            // Some indexes may already be gone
            coordinator.restore().await.ok();
            return Err(e).context("Failed to drop secondary indexes");
        }

        let result = scheduler.run(&files).await;
        let restored = coordinator.restore().await;

        let report = result.context("Import run aborted")?;
        restored.context("Failed to restore secondary indexes")?;
        Ok(report)
    }
}

/// Wait for a spawned startup task and log how it ended
///
/// A panic inside the task is reported here instead of vanishing with the
/// dropped handle. Returns the task's output when it finished normally.
pub async fn watch_startup<T>(handle: JoinHandle<T>) -> Option<T> {
    match handle.await {
        Ok(output) => {
            debug!("Startup task finished");
            Some(output)
        },
        Err(e) if e.is_panic() => {
            error!(error = %e, "Startup task panicked; import and analytics state is incomplete");
            None
        },
        Err(e) => {
            warn!(error = %e, "Startup task was cancelled");
            None
        },
    }
}
