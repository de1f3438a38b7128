//! In-memory activity store
//!
//! Mirrors the semantics of the `activities` table (conflict-ignoring inserts,
//! a primary key that cannot be dropped, create-if-not-exists indexes) without
//! a database. Failures can be injected to exercise the retry policy and the
//! partial-cache behavior of the precomputer.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{ActivityStore, IndexDef, StoreError, StoreResult};
use crate::analytics::projections::{OutcomeCounts, Projection};
use crate::models::{ActivityRecord, Product, Status};

const PRIMARY_KEY_INDEX: &str = "activities_pkey";

#[derive(Debug)]
pub struct MemoryActivityStore {
    records: Mutex<HashMap<Uuid, ActivityRecord>>,
    indexes: Mutex<BTreeSet<String>>,
    failing_writes: AtomicU32,
    failing_queries: Mutex<HashSet<Projection>>,
    write_calls: AtomicUsize,
}

impl Default for MemoryActivityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryActivityStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            indexes: Mutex::new(BTreeSet::from([PRIMARY_KEY_INDEX.to_string()])),
            failing_writes: AtomicU32::new(0),
            failing_queries: Mutex::new(HashSet::new()),
            write_calls: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` calls to `insert_batch` fail
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Make every query backing `projection` fail until cleared
    pub fn fail_query(&self, projection: Projection) {
        lock(&self.failing_queries).insert(projection);
    }

    pub fn clear_query_failures(&self) {
        lock(&self.failing_queries).clear();
    }

    /// Number of `insert_batch` calls, including failed ones
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn index_names(&self) -> Vec<String> {
        lock(&self.indexes).iter().cloned().collect()
    }

    pub fn get(&self, event_id: &Uuid) -> Option<ActivityRecord> {
        lock(&self.records).get(event_id).cloned()
    }

    fn check_query(&self, projection: Projection) -> StoreResult<()> {
        if lock(&self.failing_queries).contains(&projection) {
            return Err(StoreError::Unavailable(format!(
                "injected failure for {}",
                projection
            )));
        }
        Ok(())
    }

    fn with_records<T>(&self, f: impl FnOnce(&HashMap<Uuid, ActivityRecord>) -> T) -> T {
        f(&lock(&self.records))
    }
}

/// A poisoned lock only means another test thread panicked; the data is intact.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn distinct_merchants<'a>(records: impl Iterator<Item = &'a ActivityRecord>) -> i64 {
    records
        .map(|r| r.merchant_id.as_str())
        .collect::<HashSet<_>>()
        .len() as i64
}

#[async_trait]
impl ActivityStore for MemoryActivityStore {
    async fn count(&self) -> StoreResult<i64> {
        Ok(lock(&self.records).len() as i64)
    }

    async fn insert_batch(&self, records: &[ActivityRecord]) -> StoreResult<u64> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }

        let mut stored = lock(&self.records);
        let mut inserted = 0u64;
        for record in records {
            if !stored.contains_key(&record.event_id) {
                stored.insert(record.event_id, record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn secondary_indexes(&self) -> StoreResult<Vec<String>> {
        Ok(lock(&self.indexes)
            .iter()
            .filter(|n| !n.ends_with("_pkey"))
            .cloned()
            .collect())
    }

    async fn drop_index(&self, name: &str) -> StoreResult<()> {
        if name == PRIMARY_KEY_INDEX {
            return Err(StoreError::Unavailable(format!(
                "cannot drop {} because the primary key requires it",
                name
            )));
        }
        lock(&self.indexes).remove(name);
        Ok(())
    }

    async fn create_index(&self, index: &IndexDef) -> StoreResult<()> {
        lock(&self.indexes).insert(index.name.to_string());
        Ok(())
    }

    async fn top_merchant_volume(&self) -> StoreResult<Option<(String, Decimal)>> {
        self.check_query(Projection::TopMerchant)?;

        let volumes = self.with_records(|records| {
            let mut volumes: BTreeMap<String, Decimal> = BTreeMap::new();
            for r in records.values().filter(|r| r.status == Status::Success) {
                *volumes.entry(r.merchant_id.clone()).or_default() += r.amount;
            }
            volumes
        });

        // BTreeMap iterates merchants ascending, so keeping the first maximum
        // gives the lowest merchant id on ties.
        let mut best: Option<(String, Decimal)> = None;
        for (merchant, total) in volumes {
            if best.as_ref().map_or(true, |(_, b)| total > *b) {
                best = Some((merchant, total));
            }
        }
        Ok(best)
    }

    async fn monthly_active_merchants(&self) -> StoreResult<Vec<(String, i64)>> {
        self.check_query(Projection::MonthlyActiveMerchants)?;

        let months = self.with_records(|records| {
            let mut months: BTreeMap<String, HashSet<String>> = BTreeMap::new();
            for r in records.values().filter(|r| r.status == Status::Success) {
                if let Some(ts) = r.event_timestamp {
                    months
                        .entry(ts.format("%Y-%m").to_string())
                        .or_default()
                        .insert(r.merchant_id.clone());
                }
            }
            months
        });

        Ok(months
            .into_iter()
            .map(|(month, merchants)| (month, merchants.len() as i64))
            .collect())
    }

    async fn product_merchant_counts(&self) -> StoreResult<Vec<(Product, i64)>> {
        self.check_query(Projection::ProductAdoption)?;

        Ok(self.with_records(|records| {
            Product::ALL
                .iter()
                .map(|p| (*p, distinct_merchants(records.values().filter(|r| r.product == *p))))
                .filter(|(_, n)| *n > 0)
                .collect()
        }))
    }

    async fn kyc_event_merchant_counts(&self) -> StoreResult<Vec<(String, i64)>> {
        self.check_query(Projection::KycFunnel)?;

        let by_type = self.with_records(|records| {
            let mut by_type: HashMap<String, HashSet<String>> = HashMap::new();
            for r in records
                .values()
                .filter(|r| r.product == Product::Kyc && r.status == Status::Success)
            {
                by_type
                    .entry(r.event_type.clone())
                    .or_default()
                    .insert(r.merchant_id.clone());
            }
            by_type
        });

        Ok(by_type
            .into_iter()
            .map(|(event_type, merchants)| (event_type, merchants.len() as i64))
            .collect())
    }

    async fn outcome_counts(&self) -> StoreResult<Vec<OutcomeCounts>> {
        self.check_query(Projection::FailureRates)?;

        Ok(self.with_records(|records| {
            let mut counts: BTreeMap<Product, (i64, i64)> = BTreeMap::new();
            for r in records.values() {
                let entry = counts.entry(r.product).or_default();
                match r.status {
                    Status::Success => entry.0 += 1,
                    Status::Failed => entry.1 += 1,
                    Status::Pending => {},
                }
            }
            counts
                .into_iter()
                .filter(|(_, (s, f))| s + f > 0)
                .map(|(product, (success, failed))| OutcomeCounts {
                    product,
                    success,
                    failed,
                })
                .collect()
        }))
    }
}
