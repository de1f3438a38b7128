//! PostgreSQL-backed activity store

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use super::{decode_product, ActivityStore, IndexDef, StoreResult};
use crate::analytics::projections::OutcomeCounts;
use crate::models::{ActivityRecord, Product};

pub const ACTIVITIES_TABLE: &str = "activities";

/// Columns bound per inserted row
const COLUMNS_PER_ROW: usize = 10;

/// PostgreSQL caps a statement at 65,535 bind parameters
const MAX_ROWS_PER_STATEMENT: usize = u16::MAX as usize / COLUMNS_PER_ROW;

#[derive(Debug, Clone)]
pub struct PgActivityStore {
    db: PgPool,
}

impl PgActivityStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }
}

/// Quote an identifier read back from the catalog
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait]
impl ActivityStore for PgActivityStore {
    async fn count(&self) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM activities")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    async fn insert_batch(&self, records: &[ActivityRecord]) -> StoreResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        // One transaction per batch so a retried batch never lands half-written.
        let mut tx = self.db.begin().await?;
        let mut inserted = 0u64;

        for chunk in records.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO activities (event_id, merchant_id, event_timestamp, product, \
                 event_type, amount, status, channel, region, merchant_tier) ",
            );
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(record.event_id)
                    .push_bind(&record.merchant_id)
                    .push_bind(record.event_timestamp)
                    .push_bind(record.product.as_str())
                    .push_bind(&record.event_type)
                    .push_bind(record.amount)
                    .push_bind(record.status.as_str())
                    .push_bind(record.channel.map(|c| c.as_str()))
                    .push_bind(record.region.as_deref())
                    .push_bind(record.merchant_tier.map(|t| t.as_str()));
            });
            builder.push(" ON CONFLICT (event_id) DO NOTHING");

            let result = builder.build().execute(&mut *tx).await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;

        debug!(rows = records.len(), inserted, "Batch written");
        Ok(inserted)
    }

    async fn secondary_indexes(&self) -> StoreResult<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT indexname::text
            FROM pg_indexes
            WHERE schemaname = current_schema() AND tablename = $1
            ORDER BY indexname
            "#,
        )
        .bind(ACTIVITIES_TABLE)
        .fetch_all(&self.db)
        .await?;

        Ok(names.into_iter().filter(|n| !n.ends_with("_pkey")).collect())
    }

    async fn drop_index(&self, name: &str) -> StoreResult<()> {
        sqlx::query(&format!("DROP INDEX IF EXISTS {}", quote_ident(name)))
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn create_index(&self, index: &IndexDef) -> StoreResult<()> {
        sqlx::query(&index.create_sql(ACTIVITIES_TABLE))
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn top_merchant_volume(&self) -> StoreResult<Option<(String, Decimal)>> {
        let row = sqlx::query_as::<_, (String, Decimal)>(
            r#"
            SELECT merchant_id, SUM(amount) AS total_volume
            FROM activities
            WHERE status = 'SUCCESS'
            GROUP BY merchant_id
            ORDER BY total_volume DESC, merchant_id ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn monthly_active_merchants(&self) -> StoreResult<Vec<(String, i64)>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT to_char(event_timestamp AT TIME ZONE 'UTC', 'YYYY-MM') AS month,
                   COUNT(DISTINCT merchant_id) AS merchants
            FROM activities
            WHERE status = 'SUCCESS' AND event_timestamp IS NOT NULL
            GROUP BY month
            ORDER BY month
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn product_merchant_counts(&self) -> StoreResult<Vec<(Product, i64)>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT product, COUNT(DISTINCT merchant_id) AS merchants
            FROM activities
            GROUP BY product
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|(product, count)| Ok((decode_product(product)?, count)))
            .collect()
    }

    async fn kyc_event_merchant_counts(&self) -> StoreResult<Vec<(String, i64)>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT event_type, COUNT(DISTINCT merchant_id) AS merchants
            FROM activities
            WHERE product = 'KYC' AND status = 'SUCCESS'
            GROUP BY event_type
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn outcome_counts(&self) -> StoreResult<Vec<OutcomeCounts>> {
        let rows = sqlx::query_as::<_, (String, i64, i64)>(
            r#"
            SELECT product,
                   COUNT(*) FILTER (WHERE status = 'SUCCESS') AS success,
                   COUNT(*) FILTER (WHERE status = 'FAILED') AS failed
            FROM activities
            WHERE status IN ('SUCCESS', 'FAILED')
            GROUP BY product
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|(product, success, failed)| {
                Ok(OutcomeCounts {
                    product: decode_product(product)?,
                    success,
                    failed,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_stays_under_bind_limit() {
        assert!(MAX_ROWS_PER_STATEMENT * COLUMNS_PER_ROW <= u16::MAX as usize);
        assert!(MAX_ROWS_PER_STATEMENT >= 5_000);
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("idx_activities_merchant_id"), "\"idx_activities_merchant_id\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }
}
