//! Transform steps and their composition.
//!
//! A transform takes one [`Asset`] and returns the rewritten asset. An asset
//! class holds an ordered list of transforms; [`compose`] runs them in
//! declaration order and stops at the first failure so a broken file never
//! reaches the build root.

use crate::build::FileError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A file moving through an asset class pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Source file the asset was read from
    pub source: PathBuf,
    /// Output path relative to the class destination directory
    pub relative: PathBuf,
    /// Current contents
    pub contents: Vec<u8>,
    /// Source map produced alongside the contents, written as `<output>.map`
    pub source_map: Option<Vec<u8>>,
}

impl Asset {
    /// Create an asset from a source path, its output-relative path, and contents.
    pub fn new(
        source: impl Into<PathBuf>,
        relative: impl Into<PathBuf>,
        contents: Vec<u8>,
    ) -> Self {
        Self {
            source: source.into(),
            relative: relative.into(),
            contents,
            source_map: None,
        }
    }

    /// Lowercased extension of the output path.
    pub fn extension(&self) -> Option<String> {
        self.relative
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    /// Change the extension of the output path.
    pub fn set_extension(&mut self, extension: &str) {
        self.relative.set_extension(extension);
    }

    /// File name of the output path.
    pub fn file_name(&self) -> &str {
        self.relative
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// View the contents as UTF-8 text.
    pub fn text(&self) -> Result<&str, String> {
        std::str::from_utf8(&self.contents).map_err(|e| {
            format!("{} is not valid UTF-8: {}", self.source.display(), e)
        })
    }
}

/// A single step in an asset class pipeline.
///
/// Implementations must be pure with respect to the asset: everything they
/// need is in the asset or in their own parameters.
pub trait Transform: Send + Sync {
    /// Name used in error messages (`compile-styles`, `babel`, ...).
    fn name(&self) -> &str;

    /// Whether this transform wants the asset at all.
    ///
    /// Returning `false` drops the file from the class without an error,
    /// e.g. stylesheet partials that are only meant to be imported.
    fn accepts(&self, _asset: &Asset) -> bool {
        true
    }

    /// Rewrite the asset.
    fn apply(&self, asset: Asset) -> Result<Asset, String>;
}

/// Shared handle to a transform; asset classes are shared across threads.
pub type SharedTransform = Arc<dyn Transform>;

/// Adapter that turns a closure into a [`Transform`].
pub struct FnTransform<F> {
    name: String,
    func: F,
}

impl<F> Transform for FnTransform<F>
where
    F: Fn(Asset) -> Result<Asset, String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, asset: Asset) -> Result<Asset, String> {
        (self.func)(asset)
    }
}

impl<F> fmt::Debug for FnTransform<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransform")
            .field("name", &self.name)
            .finish()
    }
}

/// Wrap a closure as a shared transform.
///
/// ```ignore
/// let upper = transform_fn("upper", |mut asset| {
///     asset.contents.make_ascii_uppercase();
///     Ok(asset)
/// });
/// ```
pub fn transform_fn<F>(name: impl Into<String>, func: F) -> SharedTransform
where
    F: Fn(Asset) -> Result<Asset, String> + Send + Sync + 'static,
{
    Arc::new(FnTransform {
        name: name.into(),
        func,
    })
}

/// Compose transforms into a single per-file function.
///
/// The returned function yields `Ok(None)` when a transform declined the
/// file, `Err` with the failing transform's name on the first failure, and
/// the final asset otherwise. Transform N+1 only ever sees the output of
/// transform N for the same file.
pub fn compose(
    transforms: &[SharedTransform],
) -> impl Fn(Asset) -> Result<Option<Asset>, FileError> + '_ {
    move |mut asset: Asset| {
        for transform in transforms {
            if !transform.accepts(&asset) {
                return Ok(None);
            }
            let file = asset.source.clone();
            asset = transform.apply(asset).map_err(|message| FileError::Transform {
                transform: transform.name().to_string(),
                file,
                message,
            })?;
        }
        Ok(Some(asset))
    }
}

/// Names of the transforms in a chain, for logs and debug output.
pub fn transform_names(transforms: &[SharedTransform]) -> Vec<&str> {
    transforms.iter().map(|t| t.name()).collect()
}

/// Whether a path's file name marks it as an import-only partial (`_vars.scss`).
pub fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('_'))
        .unwrap_or(false)
}
