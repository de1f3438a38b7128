//! Secondary index lifecycle around a bulk load
//!
//! Secondary indexes slow down bulk inserts, so every index except the
//! primary key is dropped before the first file and the fixed set below is
//! rebuilt once all files have been processed, whether the run succeeded or not.

use tracing::{info, warn};

use crate::store::{ActivityStore, IndexDef, StoreResult};

/// Indexes the analytics queries rely on
pub const ACTIVITY_INDEXES: &[IndexDef] = &[
    IndexDef {
        name: "idx_activities_status_product",
        columns: &["status", "product"],
    },
    IndexDef {
        name: "idx_activities_merchant_id",
        columns: &["merchant_id"],
    },
    IndexDef {
        name: "idx_activities_event_timestamp",
        columns: &["event_timestamp"],
    },
    IndexDef {
        name: "idx_activities_merchant_status_product",
        columns: &["merchant_id", "status", "product"],
    },
    IndexDef {
        name: "idx_activities_timestamp_status",
        columns: &["event_timestamp", "status"],
    },
];

pub struct IndexCoordinator<'a> {
    store: &'a dyn ActivityStore,
}

impl<'a> IndexCoordinator<'a> {
    pub fn new(store: &'a dyn ActivityStore) -> Self {
        Self { store }
    }

    /// Drop every secondary index; returns the dropped names
    pub async fn suspend(&self) -> StoreResult<Vec<String>> {
        let names = self.store.secondary_indexes().await?;
        for name in &names {
            self.store.drop_index(name).await?;
        }
        info!(dropped = names.len(), "Secondary indexes dropped for bulk load");
        Ok(names)
    }

    /// Create the fixed index set; safe to call repeatedly
    ///
    /// Keeps going past a failed index so one bad definition cannot leave the
    /// table without the rest. The first error is returned.
    pub async fn restore(&self) -> StoreResult<()> {
        let mut first_error = None;
        for index in ACTIVITY_INDEXES {
            if let Err(e) = self.store.create_index(index).await {
                warn!(index = index.name, error = %e, "Failed to create index");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(count = ACTIVITY_INDEXES.len(), "Secondary indexes restored");
                Ok(())
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryActivityStore;

    #[tokio::test]
    async fn test_suspend_then_restore() {
        let store = MemoryActivityStore::new();
        let coordinator = IndexCoordinator::new(&store);

        coordinator.restore().await.unwrap();
        assert_eq!(store.secondary_indexes().await.unwrap().len(), ACTIVITY_INDEXES.len());

        let dropped = coordinator.suspend().await.unwrap();
        assert_eq!(dropped.len(), ACTIVITY_INDEXES.len());
        assert!(store.secondary_indexes().await.unwrap().is_empty());
        assert_eq!(store.index_names(), vec!["activities_pkey".to_string()]);

        coordinator.restore().await.unwrap();
        coordinator.restore().await.unwrap();
        let mut names = store.secondary_indexes().await.unwrap();
        names.sort();
        let mut expected: Vec<_> = ACTIVITY_INDEXES.iter().map(|i| i.name.to_string()).collect();
        expected.sort();
        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn test_suspend_drops_unknown_secondary_indexes() {
        let store = MemoryActivityStore::new();
        let stray = IndexDef {
            name: "idx_activities_region",
            columns: &["region"],
        };
        store.create_index(&stray).await.unwrap();

        let dropped = IndexCoordinator::new(&store).suspend().await.unwrap();
        assert_eq!(dropped, vec!["idx_activities_region".to_string()]);
    }

    #[test]
    fn test_index_names_are_unique() {
        let mut names: Vec<_> = ACTIVITY_INDEXES.iter().map(|i| i.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 5);
        assert!(names.iter().all(|n| !n.ends_with("_pkey")));
    }
}
