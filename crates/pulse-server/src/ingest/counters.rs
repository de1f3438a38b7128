//! Import run totals shared between the background run and readers

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::importer::FileImportStats;

#[derive(Debug, Default)]
pub struct ImportTotals {
    imported: AtomicU64,
    skipped: AtomicU64,
    complete: AtomicBool,
}

impl ImportTotals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in the result of one finished file
    pub fn add_file(&self, stats: &FileImportStats) {
        self.imported.fetch_add(stats.imported, Ordering::Relaxed);
        self.skipped.fetch_add(stats.skipped, Ordering::Relaxed);
    }

    pub fn imported(&self) -> u64 {
        self.imported.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Mark the import finished; there is no way back
    pub fn mark_complete(&self) {
        self.complete.store(true, Ordering::Release);
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }
}
