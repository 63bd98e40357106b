//! Built-in transforms.
//!
//! Stylesheets and images are handled in-process; everything else (template
//! compiler, script transpiler, minifier) runs as an external [`Command`].

pub mod command;
pub mod images;
pub mod styles;

pub use command::Command;
pub use images::OptimizeImages;
pub use styles::{parse_browsers, Autoprefix, CompileStyles};

use crate::build::SharedTransform;
use crate::config::TransformConfig;
use std::sync::Arc;

/// Construct a transform from its config entry.
pub fn build_transform(config: &TransformConfig) -> Result<SharedTransform, String> {
    let transform: SharedTransform = match config {
        TransformConfig::CompileStyles { compressed } => Arc::new(CompileStyles::new(*compressed)),
        TransformConfig::Autoprefix { browsers } => Arc::new(Autoprefix::new(browsers)?),
        TransformConfig::OptimizeImages { level } => Arc::new(OptimizeImages::new(*level)?),
        TransformConfig::Command {
            program,
            args,
            extension,
            source_map_arg,
        } => {
            let mut command = Command::new(program.clone(), args.clone());
            if let Some(extension) = extension {
                command = command.with_extension(extension.clone());
            }
            if let Some(arg) = source_map_arg {
                command = command.with_source_map_arg(arg.clone());
            }
            Arc::new(command)
        }
    };
    Ok(transform)
}
