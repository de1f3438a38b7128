//! Analytics precomputation
//!
//! Launches the five aggregation queries together and waits for all of them.
//! A query that succeeds replaces its cache slot; a query that fails is logged
//! and leaves the slot as it was. Once every query has settled the cache is
//! marked ready, even when some of them failed.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

use super::cache::AnalyticsCache;
use super::projections::{self, Projection};
use crate::store::{ActivityStore, StoreError, StoreResult};

/// Queries slower than this are logged as slow
pub const DEFAULT_SLOW_QUERY_THRESHOLD: Duration = Duration::from_millis(100);

/// Outcome of one precompute pass
#[derive(Debug, Default)]
pub struct PrecomputeReport {
    pub refreshed: Vec<Projection>,
    /// Refreshed projections whose query ran over the slow threshold
    pub slow: Vec<Projection>,
    pub failed: Vec<(Projection, String)>,
    pub elapsed: Duration,
}

impl PrecomputeReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct AnalyticsPrecomputer {
    store: Arc<dyn ActivityStore>,
    cache: Arc<AnalyticsCache>,
    slow_threshold: Duration,
}

impl AnalyticsPrecomputer {
    pub fn new(store: Arc<dyn ActivityStore>, cache: Arc<AnalyticsCache>) -> Self {
        Self {
            store,
            cache,
            slow_threshold: DEFAULT_SLOW_QUERY_THRESHOLD,
        }
    }

    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    /// Run every query once and open the readiness gate
    #[instrument(skip(self))]
    pub async fn run(&self) -> PrecomputeReport {
        let started = Instant::now();
        let store = &self.store;
        let cache = &self.cache;

        let (top, monthly, adoption, kyc, failure) = tokio::join!(
            self.refresh(Projection::TopMerchant, async {
                let raw = store.top_merchant_volume().await?;
                cache.set_top_merchant(projections::top_merchant(raw));
                Ok::<_, StoreError>(())
            }),
            self.refresh(Projection::MonthlyActiveMerchants, async {
                let rows = store.monthly_active_merchants().await?;
                cache.set_monthly_active_merchants(projections::monthly_active_merchants(rows));
                Ok::<_, StoreError>(())
            }),
            self.refresh(Projection::ProductAdoption, async {
                let rows = store.product_merchant_counts().await?;
                cache.set_product_adoption(projections::product_adoption(rows));
                Ok::<_, StoreError>(())
            }),
            self.refresh(Projection::KycFunnel, async {
                let rows = store.kyc_event_merchant_counts().await?;
                cache.set_kyc_funnel(projections::kyc_funnel(rows));
                Ok::<_, StoreError>(())
            }),
            self.refresh(Projection::FailureRates, async {
                let rows = store.outcome_counts().await?;
                cache.set_failure_rates(projections::failure_rates(rows));
                Ok::<_, StoreError>(())
            }),
        );

        let mut report = PrecomputeReport::default();
        for (projection, outcome) in Projection::ALL
            .into_iter()
            .zip([top, monthly, adoption, kyc, failure])
        {
            match outcome {
                Ok(elapsed) => {
                    if self.is_slow(elapsed) {
                        report.slow.push(projection);
                    }
                    report.refreshed.push(projection);
                },
                Err(e) => report.failed.push((projection, e.to_string())),
            }
        }

        self.cache.mark_ready();
        report.elapsed = started.elapsed();

        if report.is_complete() {
            info!(
                slow = report.slow.len(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Analytics precomputed"
            );
        } else {
            warn!(
                refreshed = report.refreshed.len(),
                failed = report.failed.len(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Analytics precomputed with failures; failed projections keep their previous values"
            );
        }

        report
    }

    fn is_slow(&self, elapsed: Duration) -> bool {
        elapsed > self.slow_threshold
    }

    /// Await one query; returns how long it took
    async fn refresh<F>(&self, projection: Projection, query: F) -> StoreResult<Duration>
    where
        F: Future<Output = StoreResult<()>>,
    {
        let started = Instant::now();
        let result = query.await;
        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;

        match result {
            Ok(()) if self.is_slow(elapsed) => {
                warn!(projection = %projection, elapsed_ms, "Slow analytics query");
            },
            Ok(()) => debug!(projection = %projection, elapsed_ms, "Analytics query finished"),
            Err(e) => {
                error!(projection = %projection, elapsed_ms, error = %e, "Analytics query failed");
                return Err(e);
            },
        }

        Ok(elapsed)
    }
}
