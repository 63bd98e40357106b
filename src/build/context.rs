//! Build context containing configuration and paths for a pipeline run.

use crate::config::{normalize_lexically, AssetflowConfig};
use std::path::{Path, PathBuf};

/// Default number of parallel class jobs (uses available parallelism).
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Build context containing configuration and paths for a build operation.
///
/// The context provides access to all information needed to execute a build,
/// including the configuration, project root, and the source and build roots.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// The loaded configuration
    config: AssetflowConfig,
    /// Project root directory (where assetflow.toml is located)
    project_root: PathBuf,
    /// Maximum number of classes built at once
    jobs: usize,
    /// Whether to run in verbose mode
    verbose: bool,
}

impl BuildContext {
    /// Create a new build context.
    ///
    /// # Arguments
    /// - `config` - The loaded configuration
    /// - `project_root` - The project root directory
    pub fn new(config: AssetflowConfig, project_root: PathBuf) -> Self {
        let jobs = config.build.jobs.unwrap_or_else(default_jobs).max(1);
        Self {
            config,
            project_root,
            jobs,
            verbose: false,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &AssetflowConfig {
        &self.config
    }

    /// Get the project root directory.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Get the source base directory (resolved to absolute path).
    pub fn src_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.src)
    }

    /// Get the build root (resolved to absolute path).
    pub fn out_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.out)
    }

    /// Number of classes built concurrently by a full build.
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Whether verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Set the class worker bound.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Reason the build root must not be removed, if any.
    ///
    /// Existing paths are compared after resolving symlinks, so an absolute
    /// or aliased build root pointing at the sources is caught as well.
    pub fn build_root_conflict(&self) -> Option<&'static str> {
        let out = resolve_existing(&self.out_dir());
        let src = resolve_existing(&self.src_dir());
        let root = resolve_existing(&self.project_root);

        if src.starts_with(&out) {
            Some("it contains the source directory")
        } else if out.starts_with(&src) {
            Some("it is inside the source directory")
        } else if root.starts_with(&out) {
            Some("it contains the project root")
        } else {
            None
        }
    }

    /// Resolve a path relative to the project root.
    ///
    /// If the path is absolute, returns it unchanged.
    /// If relative, joins it with the project root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

fn resolve_existing(path: &Path) -> PathBuf {
    path.canonicalize()
        .unwrap_or_else(|_| normalize_lexically(path))
}
