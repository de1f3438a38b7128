//! Record store for activity events
//!
//! The ingestion pipeline and the analytics precomputer only talk to the
//! store through [`ActivityStore`]. Two implementations exist:
//!
//! - [`PgActivityStore`]: the `activities` table in PostgreSQL
//! - [`MemoryActivityStore`]: an in-process map used by tests and dry runs
//!
//! Writes are idempotent: inserting a record whose `event_id` already exists
//! is a no-op, and the returned count only includes rows actually written.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::analytics::projections::OutcomeCounts;
use crate::models::{ActivityRecord, Product};

pub mod memory;
pub mod postgres;

pub use memory::MemoryActivityStore;
pub use postgres::PgActivityStore;

/// Store operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database query failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Unexpected value in column {column}: {value}")]
    Decode { column: &'static str, value: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A secondary index maintained on the `activities` table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDef {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

impl IndexDef {
    pub fn create_sql(&self, table: &str) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            self.name,
            table,
            self.columns.join(", ")
        )
    }
}

#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Number of stored records
    async fn count(&self) -> StoreResult<i64>;

    /// Insert a batch, ignoring records whose `event_id` already exists
    ///
    /// Returns the number of rows written.
    async fn insert_batch(&self, records: &[ActivityRecord]) -> StoreResult<u64>;

    /// Names of every index on the table except the primary key
    async fn secondary_indexes(&self) -> StoreResult<Vec<String>>;

    async fn drop_index(&self, name: &str) -> StoreResult<()>;

    /// Create an index if it does not exist yet
    async fn create_index(&self, index: &IndexDef) -> StoreResult<()>;

    /// Merchant with the largest SUCCESS volume (ties: lowest merchant id)
    async fn top_merchant_volume(&self) -> StoreResult<Option<(String, Decimal)>>;

    /// `(YYYY-MM, distinct merchants)` over SUCCESS rows with a timestamp
    async fn monthly_active_merchants(&self) -> StoreResult<Vec<(String, i64)>>;

    /// Distinct merchants per product across all statuses
    async fn product_merchant_counts(&self) -> StoreResult<Vec<(Product, i64)>>;

    /// Distinct merchants per `event_type` over successful KYC events
    async fn kyc_event_merchant_counts(&self) -> StoreResult<Vec<(String, i64)>>;

    /// SUCCESS and FAILED counts per product
    async fn outcome_counts(&self) -> StoreResult<Vec<OutcomeCounts>>;
}

pub(crate) fn decode_product(value: String) -> StoreResult<Product> {
    value.parse().map_err(|_| StoreError::Decode {
        column: "product",
        value,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_index_create_sql() {
        let index = IndexDef {
            name: "idx_activities_status_product",
            columns: &["status", "product"],
        };
        assert_eq!(
            index.create_sql("activities"),
            "CREATE INDEX IF NOT EXISTS idx_activities_status_product ON activities (status, product)"
        );
    }

    #[test]
    fn test_decode_product_rejects_unknown() {
        assert!(matches!(decode_product("POS".to_string()), Ok(Product::Pos)));
        let err = decode_product("LOANS".to_string()).unwrap_err();
        assert!(err.to_string().contains("LOANS"));
    }
}
