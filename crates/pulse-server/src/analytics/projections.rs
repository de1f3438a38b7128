//! The five cached analytics projections
//!
//! Stores return raw aggregates (sums and distinct counts); the functions here
//! apply the presentation rules shared by every store: rounding, ordering,
//! stage mapping and rate computation.

use rust_decimal::Decimal;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use crate::models::{round_cents, Product};

/// Identifies one projection, used for logging and slot bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Projection {
    TopMerchant,
    MonthlyActiveMerchants,
    ProductAdoption,
    KycFunnel,
    FailureRates,
}

impl Projection {
    pub const ALL: [Projection; 5] = [
        Projection::TopMerchant,
        Projection::MonthlyActiveMerchants,
        Projection::ProductAdoption,
        Projection::KycFunnel,
        Projection::FailureRates,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Projection::TopMerchant => "top_merchant",
            Projection::MonthlyActiveMerchants => "monthly_active_merchants",
            Projection::ProductAdoption => "product_adoption",
            Projection::KycFunnel => "kyc_funnel",
            Projection::FailureRates => "failure_rates",
        }
    }
}

impl std::fmt::Display for Projection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Merchant with the highest successful volume
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopMerchant {
    pub merchant_id: String,
    pub total_volume: Decimal,
}

/// Distinct active merchants keyed by `YYYY-MM`; key order is chronological
pub type MonthlyActiveMerchants = BTreeMap<String, i64>;

/// Distinct merchants per product, most adopted first
///
/// Serializes as a JSON object whose key order is the adoption order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductAdoption(Vec<(Product, i64)>);

impl ProductAdoption {
    pub fn entries(&self) -> &[(Product, i64)] {
        &self.0
    }

    pub fn get(&self, product: Product) -> Option<i64> {
        self.0.iter().find(|(p, _)| *p == product).map(|(_, n)| *n)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ProductAdoption {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (product, count) in &self.0 {
            map.serialize_entry(product.as_str(), count)?;
        }
        map.end()
    }
}

/// Distinct merchants that reached each KYC stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KycFunnel {
    pub documents_submitted: i64,
    pub verifications_completed: i64,
    pub tier_upgrades: i64,
}

/// Share of decided (SUCCESS or FAILED) events that failed, in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FailureRate {
    pub product: Product,
    pub failure_rate: f64,
}

/// Per-product outcome counts as returned by a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub product: Product,
    pub success: i64,
    pub failed: i64,
}

pub fn top_merchant(raw: Option<(String, Decimal)>) -> Option<TopMerchant> {
    raw.map(|(merchant_id, total)| TopMerchant {
        merchant_id,
        total_volume: round_cents(total),
    })
}

pub fn monthly_active_merchants<I>(rows: I) -> MonthlyActiveMerchants
where
    I: IntoIterator<Item = (String, i64)>,
{
    rows.into_iter().collect()
}

pub fn product_adoption<I>(rows: I) -> ProductAdoption
where
    I: IntoIterator<Item = (Product, i64)>,
{
    let mut entries: Vec<_> = rows.into_iter().collect();
    entries.sort_by(|(pa, a), (pb, b)| b.cmp(a).then_with(|| pa.as_str().cmp(pb.as_str())));
    ProductAdoption(entries)
}

/// Map `event_type` counts onto the three funnel stages; other types are ignored
pub fn kyc_funnel<I>(rows: I) -> KycFunnel
where
    I: IntoIterator<Item = (String, i64)>,
{
    let mut funnel = KycFunnel::default();
    for (event_type, count) in rows {
        match event_type.as_str() {
            "DOCUMENT_SUBMITTED" => funnel.documents_submitted = count,
            "VERIFICATION_COMPLETED" => funnel.verifications_completed = count,
            "TIER_UPGRADE" => funnel.tier_upgrades = count,
            _ => {},
        }
    }
    funnel
}

/// Products with no decided events are left out rather than divided by zero
pub fn failure_rates<I>(rows: I) -> Vec<FailureRate>
where
    I: IntoIterator<Item = OutcomeCounts>,
{
    let mut rates: Vec<FailureRate> = rows
        .into_iter()
        .filter_map(|c| {
            let decided = c.success + c.failed;
            (decided > 0).then(|| FailureRate {
                product: c.product,
                failure_rate: round1(c.failed as f64 * 100.0 / decided as f64),
            })
        })
        .collect();

    rates.sort_by(|a, b| {
        b.failure_rate
            .total_cmp(&a.failure_rate)
            .then_with(|| a.product.as_str().cmp(b.product.as_str()))
    });
    rates
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
