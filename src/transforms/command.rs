//! External program transform.
//!
//! The asset contents are written to the program's stdin and its stdout
//! becomes the new contents. Arguments may reference `{file}` (the source
//! path) and `{map}` (a scratch file the program writes a source map to).

use crate::build::{Asset, Transform};
use std::io::Write;
use std::process::{Command as Process, Stdio};

const FILE_PLACEHOLDER: &str = "{file}";
const MAP_PLACEHOLDER: &str = "{map}";

/// Pipe assets through an external program.
#[derive(Debug, Clone)]
pub struct Command {
    program: String,
    args: Vec<String>,
    extension: Option<String>,
    source_map_arg: Option<String>,
}

impl Command {
    /// Create a command transform.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            extension: None,
            source_map_arg: None,
        }
    }

    /// Replace the output extension (`pug` templates become `html`).
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// Extra argument that makes the program write a source map to `{map}`.
    pub fn with_source_map_arg(mut self, arg: impl Into<String>) -> Self {
        self.source_map_arg = Some(arg.into());
        self
    }

    fn expand(&self, arg: &str, file: &str, map: Option<&str>) -> String {
        let arg = arg.replace(FILE_PLACEHOLDER, file);
        match map {
            Some(map) => arg.replace(MAP_PLACEHOLDER, map),
            None => arg,
        }
    }
}

impl Transform for Command {
    fn name(&self) -> &str {
        &self.program
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, String> {
        let map_file = match self.source_map_arg {
            Some(_) => Some(
                tempfile::NamedTempFile::new()
                    .map_err(|e| format!("cannot create source map file: {}", e))?,
            ),
            None => None,
        };
        let map_path = map_file.as_ref().map(|f| f.path().display().to_string());
        let file = asset.source.display().to_string();

        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|a| self.expand(a, &file, map_path.as_deref()))
            .collect();
        if let Some(arg) = &self.source_map_arg {
            args.push(self.expand(arg, &file, map_path.as_deref()));
        }

        tracing::trace!(program = %self.program, ?args, "spawning");
        let mut child = Process::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to run '{}': {}", self.program, e))?;

        // Feed stdin from a separate thread so a program that fills its
        // stdout pipe before reading all input cannot deadlock us.
        let input = std::mem::take(&mut asset.contents);
        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || {
                // A program may exit without reading stdin; its exit status
                // reports the real problem.
                let _ = stdin.write_all(&input);
            })
        });

        let output = child
            .wait_with_output()
            .map_err(|e| format!("failed to wait for '{}': {}", self.program, e))?;
        if let Some(writer) = writer {
            let _ = writer.join();
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(if stderr.is_empty() {
                format!("'{}' exited with {}", self.program, output.status)
            } else {
                stderr
            });
        }

        asset.contents = output.stdout;
        if let Some(extension) = &self.extension {
            asset.set_extension(extension);
        }
        if let Some(map_file) = map_file {
            let map = std::fs::read(map_file.path())
                .map_err(|e| format!("cannot read source map: {}", e))?;
            if !map.is_empty() {
                asset.source_map = Some(map);
            }
        }

        Ok(asset)
    }
}
