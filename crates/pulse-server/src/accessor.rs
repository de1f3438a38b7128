//! Read-side view over the import counters and the analytics cache
//!
//! Import status is always readable. Analytics reads return [`NotReady`]
//! until the first precompute pass has finished.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::analytics::{AnalyticsCache, FailureRate, KycFunnel, NotReady, ProductAdoption, TopMerchant};
use crate::ingest::ImportTotals;

#[derive(Debug, Clone)]
pub struct Insights {
    totals: Arc<ImportTotals>,
    cache: Arc<AnalyticsCache>,
}

impl Insights {
    pub fn new(totals: Arc<ImportTotals>, cache: Arc<AnalyticsCache>) -> Self {
        Self { totals, cache }
    }

    pub fn is_import_complete(&self) -> bool {
        self.totals.is_complete()
    }

    pub fn total_imported(&self) -> u64 {
        self.totals.imported()
    }

    pub fn total_skipped(&self) -> u64 {
        self.totals.skipped()
    }

    pub fn is_analytics_ready(&self) -> bool {
        self.cache.is_ready()
    }

    fn gate(&self) -> Result<&AnalyticsCache, NotReady> {
        if self.cache.is_ready() {
            Ok(&self.cache)
        } else {
            Err(NotReady)
        }
    }

    pub fn top_merchant(&self) -> Result<Option<TopMerchant>, NotReady> {
        Ok(self.gate()?.top_merchant().as_ref().clone())
    }

    pub fn monthly_active_merchants(&self) -> Result<BTreeMap<String, i64>, NotReady> {
        Ok(self.gate()?.monthly_active_merchants().as_ref().clone())
    }

    pub fn product_adoption(&self) -> Result<ProductAdoption, NotReady> {
        Ok(self.gate()?.product_adoption().as_ref().clone())
    }

    pub fn kyc_funnel(&self) -> Result<KycFunnel, NotReady> {
        Ok(*self.gate()?.kyc_funnel())
    }

    pub fn failure_rates(&self) -> Result<Vec<FailureRate>, NotReady> {
        Ok(self.gate()?.failure_rates().as_ref().clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ingest::FileImportStats;
    use crate::models::Product;

    #[test]
    fn test_reads_are_gated_until_ready() {
        let totals = Arc::new(ImportTotals::new());
        let cache = Arc::new(AnalyticsCache::new());
        let insights = Insights::new(totals.clone(), cache.clone());

        assert_eq!(insights.top_merchant(), Err(NotReady));
        assert_eq!(insights.monthly_active_merchants(), Err(NotReady));
        assert_eq!(insights.product_adoption(), Err(NotReady));
        assert_eq!(insights.kyc_funnel(), Err(NotReady));
        assert_eq!(insights.failure_rates(), Err(NotReady));

        cache.set_failure_rates(vec![FailureRate {
            product: Product::Bills,
            failure_rate: 5.0,
        }]);
        assert_eq!(insights.failure_rates(), Err(NotReady));

        cache.mark_ready();
        assert_eq!(insights.failure_rates().unwrap().len(), 1);
        assert_eq!(insights.top_merchant(), Ok(None));
        assert_eq!(insights.kyc_funnel(), Ok(KycFunnel::default()));
    }

    #[test]
    fn test_import_status_is_always_readable() {
        let totals = Arc::new(ImportTotals::new());
        let insights = Insights::new(totals.clone(), Arc::new(AnalyticsCache::new()));

        totals.add_file(&FileImportStats {
            file: "activities_20240101.csv".to_string(),
            imported: 7,
            skipped: 2,
            seen: 9,
        });

        assert!(!insights.is_import_complete());
        assert_eq!(insights.total_imported(), 7);
        assert_eq!(insights.total_skipped(), 2);

        totals.mark_complete();
        assert!(insights.is_import_complete());
        assert!(!insights.is_analytics_ready());
    }
}
