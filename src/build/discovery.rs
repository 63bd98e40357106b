//! Source file discovery for the build system.
//!
//! Asset class patterns are globs relative to the source base directory.
//! Brace alternatives (`*.{jpg,png}`) are expanded before matching since the
//! `glob` crate does not understand them. Dotfiles are never matched.

use glob::{glob_with, MatchOptions, Pattern};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Error during source discovery.
#[derive(Debug)]
pub enum DiscoveryError {
    /// Invalid glob pattern
    InvalidPattern(String, glob::PatternError),
    /// IO error during file enumeration
    Io(std::io::Error),
}

impl std::fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryError::InvalidPattern(pattern, err) => {
                write!(f, "Invalid glob pattern '{}': {}", pattern, err)
            }
            DiscoveryError::Io(err) => write!(f, "IO error during discovery: {}", err),
        }
    }
}

impl std::error::Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiscoveryError::InvalidPattern(_, err) => Some(err),
            DiscoveryError::Io(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for DiscoveryError {
    fn from(err: std::io::Error) -> Self {
        DiscoveryError::Io(err)
    }
}

/// Matching options shared by discovery and watch-event routing, so both
/// agree on which files a pattern covers.
pub fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    }
}

/// Expand `{a,b}` alternatives into separate patterns.
///
/// Nested groups are supported; a pattern without braces is returned as is.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };

    // Find the matching close brace and the top-level commas inside it.
    let mut depth = 0;
    let mut close = None;
    let mut splits = Vec::new();
    for (i, c) in pattern[open..].char_indices() {
        let i = open + i;
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            ',' if depth == 1 => splits.push(i),
            _ => {}
        }
    }

    let Some(close) = close else {
        // Unbalanced; let glob report it as written.
        return vec![pattern.to_string()];
    };

    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    let mut bounds = vec![open];
    bounds.extend(splits);
    bounds.push(close);

    bounds
        .windows(2)
        .flat_map(|w| {
            let alternative = &pattern[w[0] + 1..w[1]];
            expand_braces(&format!("{}{}{}", prefix, alternative, suffix))
        })
        .collect()
}

/// The directory part of a pattern before its first wildcard.
///
/// `img/**/*.png` has base `img`; paths written to the destination are
/// relative to this base, and watch mode subscribes to it.
pub fn static_base(pattern: &str) -> PathBuf {
    let segments: Vec<&str> = pattern.split('/').collect();
    let literal: Vec<&str> = segments
        .iter()
        .take_while(|s| !s.contains(['*', '?', '[', '{']))
        .copied()
        .collect();

    if literal.len() == segments.len() {
        // No wildcard at all: the pattern names a single file.
        return Path::new(pattern)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
    }

    literal.iter().filter(|s| !s.is_empty()).collect()
}

/// Compile a class pattern (with brace alternatives) into glob patterns.
pub fn compile_patterns(pattern: &str) -> Result<Vec<Pattern>, DiscoveryError> {
    expand_braces(pattern)
        .into_iter()
        .map(|p| {
            Pattern::new(&p).map_err(|e| DiscoveryError::InvalidPattern(pattern.to_string(), e))
        })
        .collect()
}

/// Discover source files matching a glob pattern.
///
/// # Arguments
/// - `base_dir` - Base directory to resolve patterns from
/// - `pattern` - Glob pattern to match (relative to `base_dir`)
///
/// # Returns
/// Sorted, deduplicated list of matching regular files.
pub fn discover_files(base_dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, DiscoveryError> {
    let escaped_base = Pattern::escape(&base_dir.to_string_lossy());
    let mut files = BTreeSet::new();

    for alternative in expand_braces(pattern) {
        let full_pattern = format!("{}/{}", escaped_base.trim_end_matches('/'), alternative);
        let paths = glob_with(&full_pattern, match_options())
            .map_err(|e| DiscoveryError::InvalidPattern(pattern.to_string(), e))?;

        for entry in paths {
            match entry {
                Ok(path) => {
                    if path.is_file() {
                        files.insert(path);
                    }
                }
                Err(e) => {
                    // Unreadable directories are skipped, not fatal
                    tracing::warn!("error reading path: {}", e);
                }
            }
        }
    }

    Ok(files.into_iter().collect())
}
