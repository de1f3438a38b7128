//! Precomputed analytics
//!
//! - **projections**: result types and the shaping rules shared by all stores
//! - **cache**: one atomically swapped slot per projection plus the readiness flag
//! - **precompute**: runs the five aggregation queries and fills the cache

use thiserror::Error;

pub mod cache;
pub mod precompute;
pub mod projections;

pub use cache::AnalyticsCache;
pub use precompute::{AnalyticsPrecomputer, PrecomputeReport};
pub use projections::{
    FailureRate, KycFunnel, MonthlyActiveMerchants, ProductAdoption, Projection, TopMerchant,
};

/// Returned by analytics reads until the first precompute pass has finished
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Analytics are still being computed, retry later")]
pub struct NotReady;
