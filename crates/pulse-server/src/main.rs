//! Pulse Server - Main entry point

use anyhow::{Context, Result};
use pulse_common::logging::{init_logging, LogConfig};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tracing::info;

use pulse_server::{
    accessor::Insights,
    analytics::AnalyticsCache,
    api::{self, AppState},
    config::Config,
    db,
    ingest::{watch_startup, ImportTotals, IngestOrchestrator, ValidationStats},
    store::{ActivityStore, PgActivityStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; LOG_* environment variables take precedence
    let log_config = LogConfig::builder()
        .log_file_prefix("pulse-server")
        .filter_directives("pulse_server=debug,tower_http=debug,sqlx=warn")
        .build()
        .merge_env()?;

    init_logging(&log_config)?;

    info!("Starting Pulse Server");

    // Load configuration
    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    // Initialize database connection pool
    let pool = db::create_pool(&db::DbConfig::from(&config.database))
        .await
        .context("Failed to connect to database")?;

    db::run_migrations(&pool).await?;

    // Shared state between the background startup task and the API
    let store: Arc<dyn ActivityStore> = Arc::new(PgActivityStore::new(pool.clone()));
    let totals = Arc::new(ImportTotals::new());
    let validation = Arc::new(ValidationStats::new());
    let cache = Arc::new(AnalyticsCache::new());
    let insights = Insights::new(totals.clone(), cache.clone());

    // Import and precompute in the background; the listener binds right away
    let startup = IngestOrchestrator::new(store, totals, validation, cache, config.ingest.clone())
        .with_slow_query_threshold(config.analytics.slow_query_threshold())
        .start();
    tokio::spawn(watch_startup(startup));
    info!(data_dir = %config.ingest.data_dir.display(), "Startup orchestrator spawned");

    let state = AppState {
        insights,
        db: Some(pool),
    };
    let app = api::create_router(state, &config.cors);

    let addr: SocketAddr = config.bind_address().parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Give ongoing requests time to complete
    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
