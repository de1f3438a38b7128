//! Streaming CSV importer
//!
//! Pulls one record at a time from an async CSV reader, validates it and
//! collects clean records into a bounded batch. A full batch is flushed before
//! the next record is read, so memory stays bounded by a single batch no
//! matter how large the file is.

use csv_async::{AsyncReaderBuilder, StringRecord};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

use super::retry::RetryPolicy;
use super::validator::{normalize_column, RowValidator};
use crate::models::ActivityRecord;
use crate::store::{ActivityStore, StoreError};

/// Default number of clean records per bulk write
pub const DEFAULT_BATCH_SIZE: usize = 5_000;

/// Errors that abort an import run
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Failed to read {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed CSV in {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: csv_async::Error,
    },

    #[error("Batch write for {file} failed after {attempts} attempts: {source}")]
    FatalWrite {
        file: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of importing one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileImportStats {
    pub file: String,
    /// Rows the store actually inserted
    pub imported: u64,
    /// Rows rejected by the validator
    pub skipped: u64,
    /// Data rows read, excluding the header
    pub seen: u64,
}

impl FileImportStats {
    /// Rows that validated but already existed in the store
    pub fn duplicates(&self) -> u64 {
        self.seen.saturating_sub(self.imported + self.skipped)
    }
}

pub struct StreamingImporter {
    store: Arc<dyn ActivityStore>,
    validator: RowValidator,
    retry: RetryPolicy,
    batch_size: usize,
}

impl StreamingImporter {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        validator: RowValidator,
        retry: RetryPolicy,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            validator,
            retry,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Import a single CSV file
    #[instrument(skip(self, path), fields(file = %file_label(path)))]
    pub async fn import_file(&self, path: &Path) -> Result<FileImportStats, ImportError> {
        let file = file_label(path);
        let mut stats = FileImportStats {
            file: file.clone(),
            ..Default::default()
        };

        let handle = tokio::fs::File::open(path)
            .await
            .map_err(|source| ImportError::Io {
                file: file.clone(),
                source,
            })?;

        let parse_error = |source| ImportError::Parse {
            file: file.clone(),
            source,
        };

        let mut reader = AsyncReaderBuilder::new()
            .flexible(true)
            .create_reader(handle);

        let columns: Vec<String> = reader
            .headers()
            .await
            .map_err(parse_error)?
            .iter()
            .map(normalize_column)
            .collect();

        debug!(columns = ?columns, "Read header");

        let mut record = StringRecord::new();
        let mut batch: Vec<ActivityRecord> = Vec::with_capacity(self.batch_size);

        while reader.read_record(&mut record).await.map_err(parse_error)? {
            stats.seen += 1;

            match self
                .validator
                .validate(columns.iter().zip(record.iter()), stats.seen)
            {
                Ok(clean) => batch.push(clean),
                Err(_) => stats.skipped += 1,
            }

            if batch.len() >= self.batch_size {
                stats.imported += self.flush(&file, &mut batch).await?;
            }
        }

        if !batch.is_empty() {
            stats.imported += self.flush(&file, &mut batch).await?;
        }

        info!(
            imported = stats.imported,
            skipped = stats.skipped,
            seen = stats.seen,
            duplicates = stats.duplicates(),
            "File imported"
        );

        Ok(stats)
    }

    async fn flush(&self, file: &str, batch: &mut Vec<ActivityRecord>) -> Result<u64, ImportError> {
        let rows: &[ActivityRecord] = batch;
        let label = format!("Batch write ({} rows, {})", rows.len(), file);

        let inserted = self
            .retry
            .run(&label, || self.store.insert_batch(rows))
            .await
            .map_err(|exhausted| ImportError::FatalWrite {
                file: file.to_string(),
                attempts: exhausted.attempts,
                source: exhausted.error,
            })?;

        debug!(rows = rows.len(), inserted, "Batch flushed");
        batch.clear();
        Ok(inserted)
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
