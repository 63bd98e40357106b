//! Pipeline command implementations (build, watch, clean)

use std::path::PathBuf;
use std::process::ExitCode;

use super::{EXIT_ERROR, EXIT_INVALID_CONFIG, EXIT_SUCCESS};
use crate::build::{BuildContext, IncrementalStats, Orchestrator, PipelineError};
use crate::config::loader::{
    default_config, find_config, load_config_file, merge_cli_overrides, CliOverrides,
};
use crate::config::{AssetflowConfig, ConfigError};
use crate::watch::{watch, StopHandle, WatchOptions};

/// Options shared by every subcommand
#[derive(Debug, Clone, Default)]
pub(crate) struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub src: Option<PathBuf>,
    pub out: Option<PathBuf>,
    pub jobs: Option<usize>,
    pub verbose: bool,
}

/// Exit code for a configuration problem.
fn config_exit_code(error: &ConfigError) -> ExitCode {
    match error {
        ConfigError::Io(_) => ExitCode::from(EXIT_ERROR),
        _ => ExitCode::from(EXIT_INVALID_CONFIG),
    }
}

/// Load the configuration, apply overrides and resolve the project root.
fn load_project(
    global: &GlobalArgs,
    overrides: CliOverrides,
) -> Result<(AssetflowConfig, PathBuf), ExitCode> {
    let config_path = global.config.clone().or_else(find_config);

    let (mut config, project_root) = match config_path {
        Some(path) => {
            tracing::debug!("using config: {}", path.display());
            let config = load_config_file(&path).map_err(|e| {
                eprintln!("Error loading config: {}", e);
                config_exit_code(&e)
            })?;
            let root = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
            (config, root)
        }
        None => {
            tracing::debug!("no assetflow.toml found, using defaults");
            (default_config(), std::env::current_dir().unwrap_or_default())
        }
    };

    let overrides = CliOverrides {
        src: global.src.clone(),
        out: global.out.clone(),
        jobs: global.jobs,
        ..overrides
    };
    merge_cli_overrides(&mut config, &overrides).map_err(|e| {
        eprintln!("Error: {}", e);
        config_exit_code(&e)
    })?;

    Ok((config, project_root))
}

/// Build the orchestrator for a loaded project.
fn create_orchestrator(
    global: &GlobalArgs,
    config: AssetflowConfig,
    project_root: PathBuf,
) -> Result<Orchestrator, ExitCode> {
    let context = BuildContext::new(config, project_root).with_verbose(global.verbose);
    Orchestrator::from_context(context).map_err(|e| {
        eprintln!("Error: {}", e);
        ExitCode::from(EXIT_INVALID_CONFIG)
    })
}

/// Run the build command
pub(crate) fn run_build(global: &GlobalArgs, list: bool) -> ExitCode {
    let (config, project_root) = match load_project(global, CliOverrides::default()) {
        Ok(project) => project,
        Err(code) => return code,
    };
    let orchestrator = match create_orchestrator(global, config, project_root) {
        Ok(o) => o,
        Err(code) => return code,
    };

    if list {
        let context = orchestrator.context();
        println!("Source: {}", context.src_dir().display());
        println!("Output: {}", context.out_dir().display());
        println!("Asset classes:");
        for class in orchestrator.registry().iter() {
            let dest = context.out_dir().join(&class.dest_dir);
            let transforms = crate::build::transform_names(&class.transforms);
            println!(
                "  - {}: {} -> {} [{}]{}",
                class.name,
                class.source_pattern,
                dest.display(),
                transforms.join(", "),
                if class.incremental { " (incremental)" } else { "" }
            );
        }
        return ExitCode::from(EXIT_SUCCESS);
    }

    println!("Building...");
    match orchestrator.run_all() {
        Ok(report) => {
            for class in &report.classes {
                if orchestrator.registry().get(&class.class).is_some_and(|c| c.incremental) {
                    tracing::debug!("{}: {}", class.class, IncrementalStats::from_report(class));
                }
            }
            println!("{}", report.summary());
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(PipelineError::BuildFailed(report)) => {
            eprintln!("{}", report.failure_message());
            eprintln!("{}", report.summary());
            ExitCode::from(EXIT_ERROR)
        }
        Err(e) => {
            eprintln!("Build error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Run the watch command
pub(crate) fn run_watch(global: &GlobalArgs, port: Option<u16>, no_reload: bool) -> ExitCode {
    let overrides = CliOverrides {
        port,
        no_reload,
        ..Default::default()
    };
    let (config, project_root) = match load_project(global, overrides) {
        Ok(project) => project,
        Err(code) => return code,
    };
    let options = WatchOptions::from_config(&config);
    let orchestrator = match create_orchestrator(global, config, project_root) {
        Ok(o) => o,
        Err(code) => return code,
    };

    let stop = StopHandle::new();
    let handler_stop = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_stop.stop()) {
        eprintln!("Error: cannot install Ctrl+C handler: {}", e);
        return ExitCode::from(EXIT_ERROR);
    }

    println!("Starting watch mode...");
    println!("Press Ctrl+C to stop");
    println!();

    match watch(orchestrator, options, &stop) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("Watch error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Run the clean command
pub(crate) fn run_clean(global: &GlobalArgs) -> ExitCode {
    let (config, project_root) = match load_project(global, CliOverrides::default()) {
        Ok(project) => project,
        Err(code) => return code,
    };
    let orchestrator = match create_orchestrator(global, config, project_root) {
        Ok(o) => o,
        Err(code) => return code,
    };

    match orchestrator.clean() {
        Ok(()) => {
            println!("Removed {}", orchestrator.context().out_dir().display());
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
