//! Writing transformed assets into the build root.
//!
//! Every write goes to a temporary file in the destination directory and is
//! renamed into place, so a watcher or browser never observes a half-written
//! output.

use crate::build::{Asset, FileError};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Extension appended to an output path for its source map.
pub const SOURCE_MAP_SUFFIX: &str = "map";

/// Write bytes to `path` atomically, creating parent directories.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Path of the source map written next to `output`.
pub fn source_map_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(".");
    name.push(SOURCE_MAP_SUFFIX);
    PathBuf::from(name)
}

/// Write an asset (and its source map, if any) under `dest_dir`.
///
/// Returns the paths written, output first.
pub fn write_asset(dest_dir: &Path, asset: &Asset) -> Result<Vec<PathBuf>, FileError> {
    let write_error = |path: &Path, source: std::io::Error| FileError::Write {
        path: path.to_path_buf(),
        file: asset.source.clone(),
        source,
    };

    let output = dest_dir.join(&asset.relative);
    write_atomic(&output, &asset.contents).map_err(|e| write_error(&output, e))?;

    let mut written = vec![output];
    if let Some(map) = &asset.source_map {
        let map_path = source_map_path(&written[0]);
        write_atomic(&map_path, map).map_err(|e| write_error(&map_path, e))?;
        written.push(map_path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_parents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("css/nested/main.css");

        write_atomic(&path, b"body{color:red}").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"body{color:red}");
    }

    #[test]
    fn test_write_atomic_overwrites() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.js");

        write_atomic(&path, b"old").unwrap();
        write_atomic(&path, b"new").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");

        // No temp files left behind
        let entries: Vec<_> = fs::read_dir(temp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_source_map_path() {
        assert_eq!(
            source_map_path(Path::new("build/js/app.js")),
            PathBuf::from("build/js/app.js.map")
        );
    }

    #[test]
    fn test_write_asset_with_source_map() {
        let temp = TempDir::new().unwrap();
        let mut asset = Asset::new("app/js/app.js", "app.js", b"x()".to_vec());
        asset.source_map = Some(b"{\"version\":3}".to_vec());

        let written = write_asset(&temp.path().join("js"), &asset).unwrap();
        assert_eq!(written.len(), 2);
        assert!(written[0].ends_with("js/app.js"));
        assert!(written[1].ends_with("js/app.js.map"));
        assert_eq!(fs::read(&written[1]).unwrap(), b"{\"version\":3}");
    }

    #[test]
    fn test_write_asset_failure_names_destination() {
        let temp = TempDir::new().unwrap();
        // A regular file where a directory is needed
        fs::write(temp.path().join("js"), b"").unwrap();

        let asset = Asset::new("app/js/app.js", "app.js", b"x()".to_vec());
        let err = write_asset(&temp.path().join("js"), &asset).unwrap_err();
        match &err {
            FileError::Write { path, .. } => assert!(path.ends_with("js/app.js")),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(err.file(), Path::new("app/js/app.js"));
    }
}
