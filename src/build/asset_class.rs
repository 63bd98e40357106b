//! Asset class definitions and the registry that holds them.
//!
//! An asset class is one named stage of the build: a source glob, a
//! destination under the build root, an ordered transform chain, and the
//! reload signal emitted after it rewrites files. Classes are immutable once
//! registered.

use crate::build::discovery::{compile_patterns, discover_files, match_options, static_base};
use crate::build::{transform_names, DiscoveryError, SharedTransform};
use crate::config::{is_contained_relative, AssetflowConfig, ClassConfig, FULL_RELOAD};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// What a live-reload client should do after a class rewrites files.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReloadKind {
    /// Reload the whole page
    Full,
    /// Hot-swap assets of this category (`css`, `js`, `img`, ...)
    Asset(String),
}

impl ReloadKind {
    /// Parse a config value: `"full"` or a category name.
    pub fn parse(value: &str) -> Self {
        if value == FULL_RELOAD {
            ReloadKind::Full
        } else {
            ReloadKind::Asset(value.to_string())
        }
    }
}

impl fmt::Display for ReloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadKind::Full => write!(f, "full"),
            ReloadKind::Asset(category) => write!(f, "asset:{}", category),
        }
    }
}

/// Error building the asset class registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two classes share a name
    #[error("asset class '{0}' is defined twice")]
    DuplicateName(String),
    /// Destination leaves the build root
    #[error("asset class '{class}': destination {} is outside the build root", .dest.display())]
    InvalidDest {
        /// Class name
        class: String,
        /// Offending destination
        dest: PathBuf,
    },
    /// Pattern does not compile
    #[error("asset class '{class}': {source}")]
    InvalidPattern {
        /// Class name
        class: String,
        /// Underlying discovery error
        #[source]
        source: DiscoveryError,
    },
    /// Two classes use the same pattern
    #[error("asset classes '{first}' and '{second}' share the pattern '{pattern}'")]
    SamePattern {
        /// First class
        first: String,
        /// Second class
        second: String,
        /// Shared pattern
        pattern: String,
    },
    /// A configured transform cannot be constructed
    #[error("asset class '{class}': {message}")]
    InvalidTransform {
        /// Class name
        class: String,
        /// Reason
        message: String,
    },
}

/// A named asset class.
#[derive(Clone)]
pub struct AssetClass {
    /// Class name (`styles`, `scripts`, ...)
    pub name: String,
    /// Source glob relative to the source base directory
    pub source_pattern: String,
    /// Destination relative to the build root
    pub dest_dir: PathBuf,
    /// Transform chain, applied in order
    pub transforms: Vec<SharedTransform>,
    /// Only reprocess files changed since the last run of this class
    pub incremental: bool,
    /// Reload signal after a successful run
    pub reload: ReloadKind,
    /// Concatenate all sources into this file instead of one output per source
    pub bundle: Option<String>,
    patterns: Vec<glob::Pattern>,
    base: PathBuf,
}

impl AssetClass {
    /// Create a class with no transforms that copies matching files.
    ///
    /// The reload category defaults to the class name.
    pub fn new(
        name: impl Into<String>,
        source_pattern: impl Into<String>,
        dest_dir: impl Into<PathBuf>,
    ) -> Result<Self, RegistryError> {
        let name = name.into();
        let source_pattern = source_pattern.into();
        let dest_dir = dest_dir.into();

        if !is_contained_relative(&dest_dir) {
            return Err(RegistryError::InvalidDest {
                class: name,
                dest: dest_dir,
            });
        }

        let patterns =
            compile_patterns(&source_pattern).map_err(|source| RegistryError::InvalidPattern {
                class: name.clone(),
                source,
            })?;
        let base = static_base(&source_pattern);
        let reload = ReloadKind::Asset(name.clone());

        Ok(Self {
            name,
            source_pattern,
            dest_dir,
            transforms: Vec::new(),
            incremental: false,
            reload,
            bundle: None,
            patterns,
            base,
        })
    }

    /// Append a transform to the chain.
    pub fn with_transform(mut self, transform: SharedTransform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Append several transforms to the chain.
    pub fn with_transforms(
        mut self,
        transforms: impl IntoIterator<Item = SharedTransform>,
    ) -> Self {
        self.transforms.extend(transforms);
        self
    }

    /// Set incremental mode.
    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    /// Set the reload signal.
    pub fn with_reload(mut self, reload: ReloadKind) -> Self {
        self.reload = reload;
        self
    }

    /// Concatenate all sources into a single output file.
    pub fn with_bundle(mut self, bundle: impl Into<String>) -> Self {
        self.bundle = Some(bundle.into());
        self
    }

    /// Build a class from its config entry.
    pub fn from_config(name: &str, config: &ClassConfig) -> Result<Self, RegistryError> {
        let transforms = config
            .transforms
            .iter()
            .map(crate::transforms::build_transform)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|message| RegistryError::InvalidTransform {
                class: name.to_string(),
                message,
            })?;

        let mut class = AssetClass::new(name, config.src.clone(), config.dest.clone())?
            .with_transforms(transforms)
            .with_incremental(config.incremental);

        if let Some(reload) = &config.reload {
            class = class.with_reload(ReloadKind::parse(reload));
        }
        if let Some(bundle) = &config.bundle {
            class = class.with_bundle(bundle.clone());
        }

        Ok(class)
    }

    /// Directory part of the pattern before its first wildcard.
    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    /// Whether a path relative to the source base directory belongs to this class.
    pub fn matches(&self, relative: &Path) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_path_with(relative, match_options()))
    }

    /// Enumerate this class's source files under the source base directory.
    pub fn discover(&self, src_dir: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
        discover_files(src_dir, &self.source_pattern)
    }

    /// Output path of a source file relative to the class destination.
    ///
    /// Paths keep their layout below the pattern's base directory, so
    /// `js/lib/util.js` under `js/**/*.js` becomes `lib/util.js`.
    pub fn output_relative(&self, src_dir: &Path, source: &Path) -> PathBuf {
        let relative = source.strip_prefix(src_dir).unwrap_or(source);
        let below_base = relative.strip_prefix(&self.base).unwrap_or(relative);
        below_base.to_path_buf()
    }
}

impl fmt::Debug for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetClass")
            .field("name", &self.name)
            .field("source_pattern", &self.source_pattern)
            .field("dest_dir", &self.dest_dir)
            .field("transforms", &transform_names(&self.transforms))
            .field("incremental", &self.incremental)
            .field("reload", &self.reload)
            .field("bundle", &self.bundle)
            .finish()
    }
}

/// Ordered, validated set of asset classes.
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    classes: Vec<AssetClass>,
}

impl AssetRegistry {
    /// Create a registry, rejecting duplicate names and identical patterns.
    pub fn new(classes: Vec<AssetClass>) -> Result<Self, RegistryError> {
        for (i, class) in classes.iter().enumerate() {
            for earlier in &classes[..i] {
                if earlier.name == class.name {
                    return Err(RegistryError::DuplicateName(class.name.clone()));
                }
                if earlier.source_pattern == class.source_pattern {
                    return Err(RegistryError::SamePattern {
                        first: earlier.name.clone(),
                        second: class.name.clone(),
                        pattern: class.source_pattern.clone(),
                    });
                }
            }
        }

        Ok(Self { classes })
    }

    /// Build the registry from the effective class list of a config.
    pub fn from_config(config: &AssetflowConfig) -> Result<Self, RegistryError> {
        let classes = config
            .effective_classes()
            .iter()
            .map(|(name, class)| AssetClass::from_config(name, class))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(classes)
    }

    /// Look up a class by name.
    pub fn get(&self, name: &str) -> Option<&AssetClass> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// Iterate over classes in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &AssetClass> {
        self.classes.iter()
    }

    /// Class names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.classes.iter().map(|c| c.name.as_str()).collect()
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether the registry has no classes.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// The class that owns a path relative to the source base directory.
    ///
    /// First match in declaration order; overlap checks at build time make
    /// this unambiguous.
    pub fn class_for(&self, relative: &Path) -> Option<&AssetClass> {
        self.classes.iter().find(|c| c.matches(relative))
    }
}
