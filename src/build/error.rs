//! Error types for the asset pipeline.
//!
//! Per-file problems ([`FileError`]) are collected into class reports and
//! never abort sibling files. [`PipelineError`] covers everything that stops
//! a whole operation.

use crate::build::{BuildReport, ClassReport, DiscoveryError, RegistryError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A failure isolated to one source file.
#[derive(Debug, Error)]
pub enum FileError {
    /// Source file missing or unreadable
    #[error("cannot read {}: {source}", .path.display())]
    SourceRead {
        /// Source path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// A transform step rejected the file
    #[error("{transform} failed on {}: {message}", .file.display())]
    Transform {
        /// Name of the failing transform
        transform: String,
        /// Source path
        file: PathBuf,
        /// Message reported by the transform
        message: String,
    },
    /// Destination could not be written
    #[error("cannot write {} (from {}): {source}", .path.display(), .file.display())]
    Write {
        /// Destination path
        path: PathBuf,
        /// Source the output was produced from
        file: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl FileError {
    /// The source file this error is about, whatever step failed.
    pub fn file(&self) -> &Path {
        match self {
            FileError::SourceRead { path, .. } => path,
            FileError::Transform { file, .. } | FileError::Write { file, .. } => file,
        }
    }
}

/// Errors that stop a pipeline operation.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The build root could not be removed
    #[error("clean failed for {}: {source}", .path.display())]
    CleanFailed {
        /// Build root
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// The build root overlaps the sources or the project root
    #[error("refusing to remove {}: {reason}", .path.display())]
    UnsafeBuildRoot {
        /// Build root
        path: PathBuf,
        /// What the build root overlaps
        reason: String,
    },
    /// No asset class with this name
    #[error("unknown asset class '{0}'")]
    UnknownClass(String),
    /// Source enumeration failed
    #[error("cannot enumerate sources for '{class}': {source}")]
    Discovery {
        /// Asset class name
        class: String,
        /// Underlying discovery error
        #[source]
        source: DiscoveryError,
    },
    /// A source file is claimed by two asset classes
    #[error("{} matches both '{first}' and '{second}'", .file.display())]
    Overlap {
        /// Conflicting file
        file: PathBuf,
        /// First class (declaration order)
        first: String,
        /// Second class
        second: String,
    },
    /// The asset class registry is invalid
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// A filesystem watcher could not be installed
    #[error("cannot watch {}: {message}", .path.display())]
    WatchSetup {
        /// Directory that could not be watched
        path: PathBuf,
        /// Reason reported by the watcher backend
        message: String,
    },
    /// One asset class finished with failed files
    #[error("{}", .0.failure_message())]
    TaskFailed(Box<ClassReport>),
    /// One or more asset classes failed during a full build
    #[error("{}", .0.failure_message())]
    BuildFailed(Box<BuildReport>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_error_display() {
        let err = FileError::Transform {
            transform: "compile-styles".to_string(),
            file: PathBuf::from("app/scss/main.scss"),
            message: "Unexpected token".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("compile-styles"));
        assert!(text.contains("app/scss/main.scss"));
        assert!(text.contains("Unexpected token"));
    }

    #[test]
    fn test_file_error_file() {
        let read = FileError::SourceRead {
            path: PathBuf::from("a.js"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(read.file(), Path::new("a.js"));

        let write = FileError::Write {
            path: PathBuf::from("build/a.js"),
            file: PathBuf::from("a.js"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(write.file(), Path::new("a.js"));
        assert!(write.to_string().contains("build/a.js"));
    }

    #[test]
    fn test_clean_failed_display() {
        let err = PipelineError::CleanFailed {
            path: PathBuf::from("build"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().starts_with("clean failed for build"));
    }

    #[test]
    fn test_overlap_display() {
        let err = PipelineError::Overlap {
            file: PathBuf::from("app/js/a.js"),
            first: "scripts".to_string(),
            second: "vendor".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("scripts") && text.contains("vendor"));
    }
}
