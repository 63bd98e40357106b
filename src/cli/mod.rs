//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_CONFIG: u8 = 2;

/// Assetflow - build front-end assets and rebuild them on change
#[derive(Parser)]
#[command(name = "assetflow")]
#[command(about = "Assetflow - compile front-end assets into a build directory")]
#[command(version)]
pub struct Cli {
    /// Path to assetflow.toml (default: search upward from the current directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Source base directory (overrides project.src)
    #[arg(long, global = true)]
    pub src: Option<PathBuf>,

    /// Build root (overrides project.out)
    #[arg(long, global = true)]
    pub out: Option<PathBuf>,

    /// Maximum number of asset classes built at the same time
    #[arg(short, long, global = true)]
    pub jobs: Option<usize>,

    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Clean the build root and build every asset class once
    Build {
        /// List the asset classes that would run, without building
        #[arg(long)]
        list: bool,
    },

    /// Build once, then rebuild affected classes when sources change
    Watch {
        /// Port for the live-reload endpoint (overrides reload.port)
        #[arg(long)]
        port: Option<u16>,

        /// Disable the live-reload endpoint
        #[arg(long)]
        no_reload: bool,
    },

    /// Remove the build root
    Clean,
}

/// Install the tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `--verbose` selects debug output.
fn init_logging(verbose: bool) {
    let default = if verbose { "assetflow=debug" } else { "assetflow=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // Fails only if a subscriber is already installed, which is fine.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let global = build::GlobalArgs {
        config: cli.config,
        src: cli.src,
        out: cli.out,
        jobs: cli.jobs,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Build { list } => build::run_build(&global, list),
        Commands::Watch { port, no_reload } => build::run_watch(&global, port, no_reload),
        Commands::Clean => build::run_clean(&global),
    }
}
