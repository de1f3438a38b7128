//! Analytics cache and readiness gate
//!
//! Every projection lives in its own [`ArcSwap`] slot. Writers replace a slot
//! wholesale, so a reader sees either the previous value or the new one. Slots
//! are independent and may have been computed at different times.

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::projections::{FailureRate, KycFunnel, MonthlyActiveMerchants, ProductAdoption, TopMerchant};

#[derive(Debug, Default)]
pub struct AnalyticsCache {
    top_merchant: ArcSwap<Option<TopMerchant>>,
    monthly_active_merchants: ArcSwap<MonthlyActiveMerchants>,
    product_adoption: ArcSwap<ProductAdoption>,
    kyc_funnel: ArcSwap<KycFunnel>,
    failure_rates: ArcSwap<Vec<FailureRate>>,
    ready: AtomicBool,
}

impl AnalyticsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Open the gate; it never closes again
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn top_merchant(&self) -> Arc<Option<TopMerchant>> {
        self.top_merchant.load_full()
    }

    pub fn set_top_merchant(&self, value: Option<TopMerchant>) {
        self.top_merchant.store(Arc::new(value));
    }

    pub fn monthly_active_merchants(&self) -> Arc<MonthlyActiveMerchants> {
        self.monthly_active_merchants.load_full()
    }

    pub fn set_monthly_active_merchants(&self, value: MonthlyActiveMerchants) {
        self.monthly_active_merchants.store(Arc::new(value));
    }

    pub fn product_adoption(&self) -> Arc<ProductAdoption> {
        self.product_adoption.load_full()
    }

    pub fn set_product_adoption(&self, value: ProductAdoption) {
        self.product_adoption.store(Arc::new(value));
    }

    pub fn kyc_funnel(&self) -> Arc<KycFunnel> {
        self.kyc_funnel.load_full()
    }

    pub fn set_kyc_funnel(&self, value: KycFunnel) {
        self.kyc_funnel.store(Arc::new(value));
    }

    pub fn failure_rates(&self) -> Arc<Vec<FailureRate>> {
        self.failure_rates.load_full()
    }

    pub fn set_failure_rates(&self, value: Vec<FailureRate>) {
        self.failure_rates.store(Arc::new(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Product;
    use rust_decimal::Decimal;

    #[test]
    fn test_starts_empty_and_not_ready() {
        let cache = AnalyticsCache::new();
        assert!(!cache.is_ready());
        assert!(cache.top_merchant().is_none());
        assert!(cache.monthly_active_merchants().is_empty());
        assert!(cache.product_adoption().is_empty());
        assert_eq!(*cache.kyc_funnel(), KycFunnel::default());
        assert!(cache.failure_rates().is_empty());
    }

    #[test]
    fn test_slots_swap_independently() {
        let cache = AnalyticsCache::new();
        cache.set_top_merchant(Some(TopMerchant {
            merchant_id: "MRC-000001".to_string(),
            total_volume: Decimal::new(1000, 2),
        }));
        let before = cache.failure_rates();

        cache.set_failure_rates(vec![FailureRate {
            product: Product::Pos,
            failure_rate: 12.5,
        }]);

        // Readers holding the old value keep it
        assert!(before.is_empty());
        assert_eq!(cache.failure_rates().len(), 1);
        assert_eq!(
            cache.top_merchant().as_ref().as_ref().map(|t| t.merchant_id.as_str()),
            Some("MRC-000001")
        );
    }

    #[test]
    fn test_ready_never_reverts() {
        let cache = AnalyticsCache::new();
        cache.mark_ready();
        cache.set_kyc_funnel(KycFunnel::default());
        cache.mark_ready();
        assert!(cache.is_ready());
    }
}
