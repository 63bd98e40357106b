//! Configuration schema types for `assetflow.toml`
//!
//! Defines the structure and validation rules for the pipeline configuration.
//! Every section is optional except `[project]`; asset classes not mentioned
//! under `[classes]` fall back to the built-in layout.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// File name searched for when locating a project configuration.
pub const CONFIG_FILE_NAME: &str = "assetflow.toml";

/// Reload value that requests a full page reload instead of a scoped swap.
pub const FULL_RELOAD: &str = "full";

/// Project metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (required)
    pub name: String,
    /// Source base directory (`app/` in the default layout)
    #[serde(default = "default_src")]
    pub src: PathBuf,
    /// Build root, wiped at the start of every full build
    #[serde(default = "default_out")]
    pub out: PathBuf,
}

fn default_src() -> PathBuf {
    PathBuf::from("app")
}

fn default_out() -> PathBuf {
    PathBuf::from("build")
}

/// Build execution settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BuildSettings {
    /// Maximum number of asset classes built at the same time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce delay in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
    /// Clear terminal between rebuilds
    #[serde(default)]
    pub clear_screen: bool,
}

fn default_debounce_ms() -> u32 {
    100
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            clear_screen: false,
        }
    }
}

/// Live-reload endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadConfig {
    /// Start the reload endpoint in watch mode
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Interface to bind
    #[serde(default = "default_reload_host")]
    pub host: String,
    /// Port to bind (0 picks a free port)
    #[serde(default = "default_reload_port")]
    pub port: u16,
}

fn default_true() -> bool {
    true
}

fn default_reload_host() -> String {
    "127.0.0.1".to_string()
}

fn default_reload_port() -> u16 {
    35729
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_reload_host(),
            port: default_reload_port(),
        }
    }
}

/// A single transform step as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TransformConfig {
    /// Compile a stylesheet to CSS
    CompileStyles {
        /// Emit minified output
        #[serde(default = "default_true")]
        compressed: bool,
    },
    /// Add vendor prefixes for a browserslist query
    Autoprefix {
        /// Browserslist queries, e.g. `["last 2 versions"]` or `["safari 15.4"]`
        #[serde(default = "default_browsers")]
        browsers: Vec<String>,
    },
    /// Recompress images
    OptimizeImages {
        /// Optimization level, 0 (fastest) to 7 (smallest)
        #[serde(default = "default_optimization_level")]
        level: u8,
    },
    /// Pipe the file through an external program (stdin to stdout)
    Command {
        /// Program to run
        program: String,
        /// Arguments; `{file}` and `{map}` are substituted
        #[serde(default)]
        args: Vec<String>,
        /// Replace the output file extension
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extension: Option<String>,
        /// Extra argument asking the program to write a source map to `{map}`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_map_arg: Option<String>,
    },
}

/// Browser query used when none is given.
pub fn default_browsers() -> Vec<String> {
    vec!["last 2 versions".to_string()]
}

fn default_optimization_level() -> u8 {
    5
}

/// Asset class definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassConfig {
    /// Source glob, relative to `project.src` (supports `{a,b}` alternatives)
    pub src: String,
    /// Destination directory, relative to the build root (empty for the root)
    #[serde(default)]
    pub dest: PathBuf,
    /// Only reprocess files modified since the last run of this class
    #[serde(default)]
    pub incremental: bool,
    /// `"full"` for a page reload, otherwise the category of a scoped reload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reload: Option<String>,
    /// Concatenate all sources into this single output file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<String>,
    /// Ordered transform steps
    #[serde(default)]
    pub transforms: Vec<TransformConfig>,
}

impl ClassConfig {
    fn new(src: &str, dest: &str, reload: &str) -> Self {
        Self {
            src: src.to_string(),
            dest: PathBuf::from(dest),
            incremental: false,
            reload: Some(reload.to_string()),
            bundle: None,
            transforms: Vec::new(),
        }
    }

    fn incremental(mut self) -> Self {
        self.incremental = true;
        self
    }

    fn with_transforms(mut self, transforms: Vec<TransformConfig>) -> Self {
        self.transforms = transforms;
        self
    }
}

/// The built-in asset classes, in declaration order.
///
/// Scripts and templates go through external programs (`babel`, `uglifyjs`,
/// `pug`); styles and images are handled in-process.
pub fn default_classes() -> Vec<(String, ClassConfig)> {
    vec![
        (
            "fonts".to_string(),
            ClassConfig::new("fonts/**/*", "fonts", "fonts").incremental(),
        ),
        (
            "images".to_string(),
            ClassConfig::new("img/**/*.{jpg,jpeg,png,svg,ico}", "img", "img")
                .incremental()
                .with_transforms(vec![TransformConfig::OptimizeImages { level: 5 }]),
        ),
        (
            "scripts".to_string(),
            ClassConfig::new("js/**/*.js", "js", "js").with_transforms(vec![
                TransformConfig::Command {
                    program: "babel".to_string(),
                    args: vec!["--filename".to_string(), "{file}".to_string()],
                    extension: None,
                    source_map_arg: None,
                },
                TransformConfig::Command {
                    program: "uglifyjs".to_string(),
                    args: vec!["--compress".to_string(), "--mangle".to_string()],
                    extension: None,
                    source_map_arg: None,
                },
            ]),
        ),
        (
            "styles".to_string(),
            ClassConfig::new("scss/**/*.scss", "css", "css").with_transforms(vec![
                TransformConfig::CompileStyles { compressed: true },
                TransformConfig::Autoprefix {
                    browsers: default_browsers(),
                },
            ]),
        ),
        (
            "views".to_string(),
            ClassConfig::new("templates/**/*.pug", "", FULL_RELOAD).with_transforms(vec![
                TransformConfig::Command {
                    program: "pug".to_string(),
                    args: vec!["--path".to_string(), "{file}".to_string()],
                    extension: Some("html".to_string()),
                    source_map_arg: None,
                },
            ]),
        ),
    ]
}

/// Complete assetflow.toml configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetflowConfig {
    /// Project metadata (required)
    pub project: ProjectConfig,
    /// Build execution settings
    #[serde(default)]
    pub build: BuildSettings,
    /// Watch mode settings
    #[serde(default)]
    pub watch: WatchConfig,
    /// Live-reload settings
    #[serde(default)]
    pub reload: ReloadConfig,
    /// Asset class overrides and additions
    #[serde(default)]
    pub classes: BTreeMap<String, ClassConfig>,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "classes.styles.dest")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "assetflow.toml: '{}' {}", self.field, self.message)
    }
}

/// Check that a destination stays inside the build root.
pub fn is_contained_relative(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Resolve `.` and `..` components without touching the filesystem.
///
/// `./app`, `app/` and `assets/../app` all normalize to `app`. Leading `..`
/// components of a relative path are kept.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    normalized.pop();
                } else if !normalized.has_root() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Whether one path is equal to or contains the other.
pub fn paths_overlap(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

impl AssetflowConfig {
    /// The effective class list: built-in classes (replaced by same-named
    /// entries from `[classes]`) followed by additional configured classes.
    pub fn effective_classes(&self) -> Vec<(String, ClassConfig)> {
        let mut classes: Vec<(String, ClassConfig)> = default_classes()
            .into_iter()
            .map(|(name, class)| {
                let class = self.classes.get(&name).cloned().unwrap_or(class);
                (name, class)
            })
            .collect();

        for (name, class) in &self.classes {
            if !classes.iter().any(|(existing, _)| existing == name) {
                classes.push((name.clone(), class.clone()));
            }
        }

        classes
    }

    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.project.name.is_empty() {
            errors.push(ConfigValidationError {
                field: "project.name".to_string(),
                message: "must be a non-empty string".to_string(),
            });
        }

        // The build root is deleted recursively; refuse anything that could
        // point at the project itself.
        let out = &self.project.out;
        let normalized_out = normalize_lexically(out);
        let normalized_src = normalize_lexically(&self.project.src);
        if out.as_os_str().is_empty() || (!is_contained_relative(out) && !out.is_absolute()) {
            errors.push(ConfigValidationError {
                field: "project.out".to_string(),
                message: "must name a directory below the project root".to_string(),
            });
        } else if normalized_out.as_os_str().is_empty() || normalized_out.parent().is_none() {
            errors.push(ConfigValidationError {
                field: "project.out".to_string(),
                message: "must not be the project root or the filesystem root".to_string(),
            });
        } else if paths_overlap(&normalized_src, &normalized_out) {
            errors.push(ConfigValidationError {
                field: "project.out".to_string(),
                message: "must not overlap the source directory".to_string(),
            });
        }

        if let Some(0) = self.build.jobs {
            errors.push(ConfigValidationError {
                field: "build.jobs".to_string(),
                message: "must be a positive integer".to_string(),
            });
        }

        if self.reload.host.is_empty() {
            errors.push(ConfigValidationError {
                field: "reload.host".to_string(),
                message: "must be a non-empty string".to_string(),
            });
        }

        for (name, class) in &self.classes {
            if class.src.trim().is_empty() {
                errors.push(ConfigValidationError {
                    field: format!("classes.{}.src", name),
                    message: "must contain a glob pattern".to_string(),
                });
            }

            if !is_contained_relative(&class.dest) {
                errors.push(ConfigValidationError {
                    field: format!("classes.{}.dest", name),
                    message: "must be a relative path inside the build root".to_string(),
                });
            }

            if let Some(reload) = &class.reload {
                if reload.is_empty() {
                    errors.push(ConfigValidationError {
                        field: format!("classes.{}.reload", name),
                        message: "must be \"full\" or a category name".to_string(),
                    });
                }
            }

            if let Some(bundle) = &class.bundle {
                if bundle.is_empty() || !is_contained_relative(Path::new(bundle)) {
                    errors.push(ConfigValidationError {
                        field: format!("classes.{}.bundle", name),
                        message: "must be a relative file name".to_string(),
                    });
                }
            }

            for (i, transform) in class.transforms.iter().enumerate() {
                match transform {
                    TransformConfig::OptimizeImages { level } if *level > 7 => {
                        errors.push(ConfigValidationError {
                            field: format!("classes.{}.transforms[{}].level", name, i),
                            message: "must be between 0 and 7".to_string(),
                        });
                    }
                    TransformConfig::Command { program, .. } if program.is_empty() => {
                        errors.push(ConfigValidationError {
                            field: format!("classes.{}.transforms[{}].program", name, i),
                            message: "must be a non-empty string".to_string(),
                        });
                    }
                    TransformConfig::Autoprefix { browsers } if browsers.is_empty() => {
                        errors.push(ConfigValidationError {
                            field: format!("classes.{}.transforms[{}].browsers", name, i),
                            message: "must list at least one browser".to_string(),
                        });
                    }
                    _ => {}
                }
            }
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}
