//! Build result types.
//!
//! Contains types for representing the outcome of class runs and full builds.

use crate::build::FileError;
use std::path::PathBuf;
use std::time::Duration;

/// Status of a single asset class run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    /// At least one file written, none failed
    Success,
    /// Nothing to do (no matching sources, or all up to date)
    Skipped,
    /// One or more files failed
    Failed(usize),
}

impl BuildStatus {
    /// Check if the status indicates success.
    pub fn is_success(&self) -> bool {
        matches!(self, BuildStatus::Success | BuildStatus::Skipped)
    }

    /// Check if the status indicates failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, BuildStatus::Failed(_))
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStatus::Success => write!(f, "success"),
            BuildStatus::Skipped => write!(f, "skipped"),
            BuildStatus::Failed(1) => write!(f, "failed: 1 file"),
            BuildStatus::Failed(n) => write!(f, "failed: {} files", n),
        }
    }
}

/// Result of running one asset class.
#[derive(Debug, Default)]
pub struct ClassReport {
    /// Asset class name
    pub class: String,
    /// Sources that went through the transform chain
    pub processed: usize,
    /// Sources skipped as up to date
    pub skipped: usize,
    /// Files written under the build root (outputs and source maps)
    pub written: Vec<PathBuf>,
    /// Per-file failures
    pub failures: Vec<FileError>,
    /// Run duration
    pub duration: Duration,
}

impl ClassReport {
    /// Create an empty report for a class.
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            ..Default::default()
        }
    }

    /// Status derived from the counters.
    pub fn status(&self) -> BuildStatus {
        if !self.failures.is_empty() {
            BuildStatus::Failed(self.failures.len())
        } else if self.written.is_empty() {
            BuildStatus::Skipped
        } else {
            BuildStatus::Success
        }
    }

    /// Check if this run had no failures.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Message naming the class and every failed file.
    pub fn failure_message(&self) -> String {
        let mut lines = vec![format!("{}: {}", self.class, self.status())];
        for failure in &self.failures {
            lines.push(format!("  - {}", failure));
        }
        lines.join("\n")
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "{}: {} written, {} up to date, {} failed in {:?}",
            self.class,
            self.written.len(),
            self.skipped,
            self.failures.len(),
            self.duration
        )
    }
}

/// Result of a complete build run.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Reports for each class, in registry order
    pub classes: Vec<ClassReport>,
    /// Total build duration
    pub total_duration: Duration,
}

impl BuildReport {
    /// Create a new empty build report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a class report.
    pub fn add_report(&mut self, report: ClassReport) {
        self.classes.push(report);
    }

    /// Set the total duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.total_duration = duration;
        self
    }

    /// Look up the report for a class.
    pub fn get(&self, class: &str) -> Option<&ClassReport> {
        self.classes.iter().find(|r| r.class == class)
    }

    /// Get the number of classes without failures.
    pub fn success_count(&self) -> usize {
        self.classes.iter().filter(|r| r.is_success()).count()
    }

    /// Get the number of failed classes.
    pub fn failed_count(&self) -> usize {
        self.classes.iter().filter(|r| !r.is_success()).count()
    }

    /// Check if the overall build succeeded (no failures).
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    /// Get all files written.
    pub fn all_written(&self) -> Vec<&PathBuf> {
        self.classes.iter().flat_map(|r| r.written.iter()).collect()
    }

    /// Get failed class reports.
    pub fn failures(&self) -> Vec<&ClassReport> {
        self.classes.iter().filter(|r| !r.is_success()).collect()
    }

    /// Message naming every failed class and its failed files.
    pub fn failure_message(&self) -> String {
        let failed = self.failures();
        let names: Vec<&str> = failed.iter().map(|r| r.class.as_str()).collect();
        let mut lines = vec![format!("Build failed in {}", names.join(", "))];
        for report in failed {
            lines.push(report.failure_message());
        }
        lines.join("\n")
    }

    /// Format a summary of the build result.
    pub fn summary(&self) -> String {
        let written = self.all_written().len();
        let total = self.classes.len();

        if self.is_success() {
            format!(
                "Build succeeded: {} classes, {} files written in {:?}",
                total, written, self.total_duration
            )
        } else {
            format!(
                "Build failed: {} succeeded, {} failed ({} total)",
                self.success_count(),
                self.failed_count(),
                total
            )
        }
    }
}
