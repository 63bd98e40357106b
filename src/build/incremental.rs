//! Incremental run support.
//!
//! Incremental classes only reprocess sources whose modification time is
//! newer than the start of the previous run of that class. Files that failed
//! on the previous pass are retried regardless of their timestamp until they
//! succeed.
//!
//! The ledger lives in memory on the orchestrator and is reset by `clean()`:
//! once the build root is gone, nothing is up to date.

use crate::build::ClassReport;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// What the ledger remembers about one class.
#[derive(Debug, Clone)]
pub struct ClassRecord {
    /// Start time of the last completed run
    pub last_run: SystemTime,
    /// Sources that failed during that run
    pub failed: BTreeSet<PathBuf>,
}

/// Per-class run history used to decide which sources need processing.
#[derive(Debug, Default)]
pub struct RunLedger {
    records: HashMap<String, ClassRecord>,
}

impl RunLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record for a class, if it has run since the last reset.
    pub fn record(&self, class: &str) -> Option<&ClassRecord> {
        self.records.get(class)
    }

    /// Check if a source needs to be processed.
    ///
    /// A file whose modification time cannot be read always runs so that the
    /// read error is reported.
    pub fn needs_run(&self, class: &str, source: &Path) -> bool {
        let Some(record) = self.records.get(class) else {
            return true;
        };
        if record.failed.contains(source) {
            return true;
        }
        match source.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified > record.last_run,
            Err(_) => true,
        }
    }

    /// Split sources into those that need processing and the number skipped.
    pub fn select(&self, class: &str, sources: Vec<PathBuf>) -> (Vec<PathBuf>, usize) {
        let total = sources.len();
        let selected: Vec<PathBuf> = sources
            .into_iter()
            .filter(|s| self.needs_run(class, s))
            .collect();
        let skipped = total - selected.len();
        (selected, skipped)
    }

    /// Record a completed run that started at `started`.
    pub fn record_run(
        &mut self,
        class: &str,
        started: SystemTime,
        failed: impl IntoIterator<Item = PathBuf>,
    ) {
        self.records.insert(
            class.to_string(),
            ClassRecord {
                last_run: started,
                failed: failed.into_iter().collect(),
            },
        );
    }

    /// Forget everything.
    pub fn reset(&mut self) {
        self.records.clear();
    }

    /// Whether no class has run since the last reset.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Statistics about an incremental class run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncrementalStats {
    /// Number of sources that were processed
    pub processed: usize,
    /// Number of sources that were skipped (up to date)
    pub skipped: usize,
    /// Number of sources that failed
    pub failed: usize,
    /// Total number of sources matched
    pub total: usize,
}

impl IncrementalStats {
    /// Create stats from a class report.
    pub fn from_report(report: &ClassReport) -> Self {
        Self {
            processed: report.processed,
            skipped: report.skipped,
            failed: report.failures.len(),
            total: report.processed + report.skipped,
        }
    }

    /// Percentage of sources skipped.
    pub fn skip_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.skipped as f64 / self.total as f64) * 100.0
        }
    }
}

impl std::fmt::Display for IncrementalStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} processed, {} up to date, {} failed ({} total)",
            self.processed, self.skipped, self.failed, self.total
        )
    }
}
