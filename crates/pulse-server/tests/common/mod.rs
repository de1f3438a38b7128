//! Common test utilities for Pulse server integration tests
//!
//! - [`ActivityFiles`]: writes `activities_YYYYMMDD.csv` files into a temp dir
//! - [`Harness`]: in-memory store plus the shared counters and cache
//! - [`TestPostgres`]: PostgreSQL container with migrations applied (needs Docker)

#![allow(dead_code)]

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::info;

use pulse_server::accessor::Insights;
use pulse_server::analytics::AnalyticsCache;
use pulse_server::ingest::{ImportTotals, IngestConfig, IngestOrchestrator, ValidationStats};
use pulse_server::store::{ActivityStore, MemoryActivityStore};

pub const HEADER: &str =
    "event_id,merchant_id,event_timestamp,product,event_type,amount,status,channel,region,merchant_tier";

/// Install a test-friendly tracing subscriber (idempotent)
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,pulse_server=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}

// ============================================================================
// CSV fixtures
// ============================================================================

/// One CSV row; every field is written verbatim
#[derive(Debug, Clone)]
pub struct Row {
    pub event_id: String,
    pub merchant_id: String,
    pub event_timestamp: String,
    pub product: String,
    pub event_type: String,
    pub amount: String,
    pub status: String,
    pub channel: String,
    pub region: String,
    pub merchant_tier: String,
}

impl Row {
    /// A valid successful POS payment numbered `n`
    pub fn valid(n: u32) -> Self {
        Self {
            event_id: format!("00000000-0000-4000-8000-{:012}", n),
            merchant_id: format!("MRC-{:06}", n),
            event_timestamp: "2024-01-15T10:00:00Z".to_string(),
            product: "POS".to_string(),
            event_type: "CARD_TRANSACTION".to_string(),
            amount: "100.00".to_string(),
            status: "SUCCESS".to_string(),
            channel: "POS".to_string(),
            region: "Lagos".to_string(),
            merchant_tier: "STARTER".to_string(),
        }
    }

    pub fn with(mut self, f: impl FnOnce(&mut Row)) -> Self {
        f(&mut self);
        self
    }

    fn to_csv(&self) -> String {
        [
            &self.event_id,
            &self.merchant_id,
            &self.event_timestamp,
            &self.product,
            &self.event_type,
            &self.amount,
            &self.status,
            &self.channel,
            &self.region,
            &self.merchant_tier,
        ]
        .iter()
        .map(|field| {
            if field.contains(',') || field.contains('"') {
                format!("\"{}\"", field.replace('"', "\"\""))
            } else {
                field.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
    }
}

/// A temporary data directory of activity files
pub struct ActivityFiles {
    dir: TempDir,
}

impl ActivityFiles {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir().context("Failed to create temp dir")?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `activities_{date}.csv` with the standard header
    pub fn write(&self, date: &str, rows: &[Row]) -> Result<PathBuf> {
        let lines: Vec<String> = rows.iter().map(Row::to_csv).collect();
        self.write_raw(&format!("activities_{}.csv", date), HEADER, &lines)
    }

    /// Write any file with an explicit header and pre-rendered lines
    pub fn write_raw(&self, name: &str, header: &str, lines: &[String]) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        let mut file = std::fs::File::create(&path)?;
        writeln!(file, "{}", header)?;
        for line in lines {
            writeln!(file, "{}", line)?;
        }
        Ok(path)
    }
}

// ============================================================================
// In-memory harness
// ============================================================================

pub struct Harness {
    pub store: Arc<MemoryActivityStore>,
    pub totals: Arc<ImportTotals>,
    pub stats: Arc<ValidationStats>,
    pub cache: Arc<AnalyticsCache>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryActivityStore::new()))
    }

    /// Fresh counters and cache over an existing store, as after a restart
    pub fn with_store(store: Arc<MemoryActivityStore>) -> Self {
        Self {
            store,
            totals: Arc::new(ImportTotals::new()),
            stats: Arc::new(ValidationStats::new()),
            cache: Arc::new(AnalyticsCache::new()),
        }
    }

    pub fn insights(&self) -> Insights {
        Insights::new(self.totals.clone(), self.cache.clone())
    }

    pub fn orchestrator(&self, data_dir: &Path) -> IngestOrchestrator {
        let store: Arc<dyn ActivityStore> = self.store.clone();
        let config = IngestConfig {
            data_dir: data_dir.to_path_buf(),
            batch_size: 2,
            retry_base_delay_ms: 10,
            ..Default::default()
        };
        IngestOrchestrator::new(
            store,
            self.totals.clone(),
            self.stats.clone(),
            self.cache.clone(),
            config,
        )
    }
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL test container wrapper with migrations applied
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string =
            format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        let pool = PgPoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        pulse_server::db::run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }
}
