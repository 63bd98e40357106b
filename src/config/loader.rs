//! Configuration loading and discovery for `assetflow.toml`
//!
//! Provides functions to find, load, and merge configuration.

use super::schema::{
    AssetflowConfig, BuildSettings, ProjectConfig, ReloadConfig, WatchConfig, CONFIG_FILE_NAME,
};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse assetflow.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", bullet_list(.0))]
    Validation(Vec<String>),
}

fn bullet_list(errors: &[String]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override source directory
    pub src: Option<PathBuf>,
    /// Override build root
    pub out: Option<PathBuf>,
    /// Number of parallel jobs
    pub jobs: Option<usize>,
    /// Override reload port
    pub port: Option<u16>,
    /// Disable the reload endpoint
    pub no_reload: bool,
}

/// Find assetflow.toml by walking up from the current working directory.
///
/// # Returns
/// - `Some(path)` if a config file is found
/// - `None` if no config file is found
pub fn find_config() -> Option<PathBuf> {
    env::current_dir().ok().and_then(find_config_from)
}

/// Find assetflow.toml by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load configuration from an assetflow.toml file.
///
/// If a path is provided, loads from that file. Otherwise, uses `find_config()`
/// to locate the config file. If no config file is found, returns a default
/// configuration.
pub fn load_config(path: Option<&Path>) -> Result<AssetflowConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(p) => load_config_file(&p),
        None => Ok(default_config()),
    }
}

/// Load configuration from a specific file path.
pub fn load_config_file(path: &Path) -> Result<AssetflowConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration text.
pub fn parse_config(contents: &str) -> Result<AssetflowConfig, ConfigError> {
    let config: AssetflowConfig = toml::from_str(contents)?;

    let errors = config.validate();
    if !errors.is_empty() {
        let messages = errors.into_iter().map(|e| e.to_string()).collect();
        return Err(ConfigError::Validation(messages));
    }

    Ok(config)
}

/// Create a default configuration when no assetflow.toml is found.
///
/// The project name is taken from the current directory name.
pub fn default_config() -> AssetflowConfig {
    let project_name = env::current_dir()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unnamed".to_string());

    AssetflowConfig {
        project: ProjectConfig {
            name: project_name,
            src: PathBuf::from("app"),
            out: PathBuf::from("build"),
        },
        build: BuildSettings::default(),
        watch: WatchConfig::default(),
        reload: ReloadConfig::default(),
        classes: BTreeMap::new(),
    }
}

/// Apply command-line overrides on top of a loaded configuration.
///
/// The merged configuration is validated again since overrides can point the
/// build root somewhere unsafe.
pub fn merge_cli_overrides(
    config: &mut AssetflowConfig,
    overrides: &CliOverrides,
) -> Result<(), ConfigError> {
    if let Some(src) = &overrides.src {
        config.project.src = src.clone();
    }
    if let Some(out) = &overrides.out {
        config.project.out = out.clone();
    }
    if let Some(jobs) = overrides.jobs {
        config.build.jobs = Some(jobs);
    }
    if let Some(port) = overrides.port {
        config.reload.port = port;
    }
    if overrides.no_reload {
        config.reload.enabled = false;
    }

    let errors = config.validate();
    if errors.is_empty() {
        Ok(())
    } else {
        let messages = errors.into_iter().map(|e| e.to_string()).collect();
        Err(ConfigError::Validation(messages))
    }
}
