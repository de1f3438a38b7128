//! File discovery and bounded file-level concurrency
//!
//! Files are imported in fixed-size chunks: every file of a chunk runs
//! concurrently, and the next chunk starts only after the whole chunk has
//! settled. A fatal error from any file ends the run once its chunk is done.

use anyhow::{Context, Result};
use futures::future::join_all;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use super::counters::ImportTotals;
use super::importer::{FileImportStats, ImportError, StreamingImporter};

/// Daily activity files, e.g. `activities_20240115.csv`
pub const FILE_PATTERN: &str = r"^activities_\d{8}\.csv$";

/// Default number of files imported at the same time
pub const DEFAULT_FILE_CONCURRENCY: usize = 3;

/// List matching files in `dir`, sorted by name
pub async fn discover_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = Regex::new(FILE_PATTERN)?;

    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read data directory {}", dir.display()))?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if pattern.is_match(name) && entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }

    files.sort();
    Ok(files)
}

/// What a completed run imported
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub files: Vec<FileImportStats>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn imported(&self) -> u64 {
        self.files.iter().map(|f| f.imported).sum()
    }

    pub fn skipped(&self) -> u64 {
        self.files.iter().map(|f| f.skipped).sum()
    }

    pub fn seen(&self) -> u64 {
        self.files.iter().map(|f| f.seen).sum()
    }

    pub fn summary(&self) -> String {
        let mut out = format!(
            "Import Summary:\n\
             - Files processed: {}\n\
             - Rows read: {}\n\
             - Imported: {}\n\
             - Skipped: {}\n\
             - Elapsed: {:.1}s",
            self.files.len(),
            self.seen(),
            self.imported(),
            self.skipped(),
            self.elapsed.as_secs_f64()
        );
        for file in &self.files {
            out.push_str(&format!(
                "\n  - {}: {} imported, {} skipped, {} duplicates",
                file.file,
                file.imported,
                file.skipped,
                file.duplicates()
            ));
        }
        out
    }
}

pub struct ConcurrencyScheduler {
    importer: Arc<StreamingImporter>,
    totals: Arc<ImportTotals>,
    concurrency: usize,
}

impl ConcurrencyScheduler {
    pub fn new(importer: Arc<StreamingImporter>, totals: Arc<ImportTotals>, concurrency: usize) -> Self {
        if concurrency == 0 {
            warn!("File concurrency of 0 requested, using 1");
        }
        Self {
            importer,
            totals,
            concurrency: concurrency.max(1),
        }
    }

    /// Import `files` chunk by chunk
    pub async fn run(&self, files: &[PathBuf]) -> Result<RunReport, ImportError> {
        let started = Instant::now();
        let chunk_count = files.len().div_ceil(self.concurrency);
        info!(
            files = files.len(),
            chunks = chunk_count,
            concurrency = self.concurrency,
            "Starting import"
        );

        let mut report = RunReport::default();

        for (index, chunk) in files.chunks(self.concurrency).enumerate() {
            info!("Processing chunk {} / {} ({} files)", index + 1, chunk_count, chunk.len());

            let results = join_all(chunk.iter().map(|path| self.importer.import_file(path))).await;

            let mut fatal = None;
            for result in results {
                match result {
                    Ok(stats) => {
                        self.totals.add_file(&stats);
                        report.files.push(stats);
                    },
                    Err(e) => {
                        error!(error = %e, "✗ File import failed");
                        if fatal.is_none() {
                            fatal = Some(e);
                        }
                    },
                }
            }

            if let Some(e) = fatal {
                warn!(
                    chunk = index + 1,
                    imported = self.totals.imported(),
                    "Aborting import run after failed chunk"
                );
                return Err(e);
            }
        }

        report.elapsed = started.elapsed();
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_file_pattern() {
        let pattern = Regex::new(FILE_PATTERN).unwrap();
        assert!(pattern.is_match("activities_20240115.csv"));
        assert!(!pattern.is_match("activities_2024015.csv"));
        assert!(!pattern.is_match("activities_20240115.csv.bak"));
        assert!(!pattern.is_match("old_activities_20240115.csv"));
        assert!(!pattern.is_match("activities_20240115.CSV"));
    }

    #[tokio::test]
    async fn test_discover_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "activities_20240103.csv",
            "activities_20240101.csv",
            "notes.txt",
            "activities_20240102.csv",
            "activities_latest.csv",
        ] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("activities_20240104.csv")).unwrap();

        let files = discover_files(dir.path()).await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "activities_20240101.csv",
                "activities_20240102.csv",
                "activities_20240103.csv"
            ]
        );
    }

    #[tokio::test]
    async fn test_discover_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_files(&dir.path().join("absent")).await.is_err());
    }

    #[test]
    fn test_report_summary() {
        let report = RunReport {
            files: vec![
                FileImportStats {
                    file: "activities_20240101.csv".to_string(),
                    imported: 10,
                    skipped: 2,
                    seen: 13,
                },
                FileImportStats {
                    file: "activities_20240102.csv".to_string(),
                    imported: 5,
                    skipped: 0,
                    seen: 5,
                },
            ],
            elapsed: Duration::from_millis(1500),
        };

        assert_eq!(report.imported(), 15);
        assert_eq!(report.skipped(), 2);
        let summary = report.summary();
        assert!(summary.contains("Files processed: 2"));
        assert!(summary.contains("activities_20240101.csv: 10 imported, 2 skipped, 1 duplicates"));
    }
}
