//! Lossless PNG recompression.

use crate::build::{Asset, Transform};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ImageEncoder, ImageFormat};

/// Highest supported optimization level.
pub const MAX_LEVEL: u8 = 7;

/// Re-encode PNG files with stronger compression.
///
/// Other formats pass through untouched. The re-encoded file is only kept
/// when it is smaller than the original.
#[derive(Debug, Clone, Copy)]
pub struct OptimizeImages {
    level: u8,
}

impl OptimizeImages {
    /// Create the transform; `level` runs from 0 (fastest) to 7 (smallest).
    pub fn new(level: u8) -> Result<Self, String> {
        if level > MAX_LEVEL {
            return Err(format!(
                "optimization level {level} is out of range 0-{MAX_LEVEL}"
            ));
        }
        Ok(Self { level })
    }

    fn encoder_settings(&self) -> (CompressionType, FilterType) {
        match self.level {
            0 => (CompressionType::Fast, FilterType::NoFilter),
            1 | 2 => (CompressionType::Fast, FilterType::Adaptive),
            3 | 4 => (CompressionType::Default, FilterType::Adaptive),
            _ => (CompressionType::Best, FilterType::Adaptive),
        }
    }

    fn recompress(&self, png: &[u8]) -> Result<Vec<u8>, String> {
        let decoded = image::load_from_memory_with_format(png, ImageFormat::Png)
            .map_err(|e| format!("invalid PNG: {}", e))?;

        let (compression, filter) = self.encoder_settings();
        let mut out = Vec::new();
        PngEncoder::new_with_quality(&mut out, compression, filter)
            .write_image(
                decoded.as_bytes(),
                decoded.width(),
                decoded.height(),
                decoded.color(),
            )
            .map_err(|e| format!("PNG encoding failed: {}", e))?;
        Ok(out)
    }
}

impl Transform for OptimizeImages {
    fn name(&self) -> &str {
        "optimize-images"
    }

    fn apply(&self, mut asset: Asset) -> Result<Asset, String> {
        if asset.extension().as_deref() != Some("png") {
            return Ok(asset);
        }

        let optimized = self.recompress(&asset.contents)?;
        if optimized.len() < asset.contents.len() {
            asset.contents = optimized;
        }
        Ok(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn sample_png() -> Vec<u8> {
        let img = RgbaImage::from_fn(64, 64, |x, _| Rgba([(x % 2) as u8 * 255, 0, 0, 255]));
        let mut png = Vec::new();
        PngEncoder::new_with_quality(&mut png, CompressionType::Fast, FilterType::NoFilter)
            .write_image(
                img.as_raw(),
                img.width(),
                img.height(),
                image::ColorType::Rgba8,
            )
            .unwrap();
        png
    }

    #[test]
    fn test_level_out_of_range() {
        assert!(OptimizeImages::new(8).is_err());
        assert!(OptimizeImages::new(0).is_ok());
    }

    #[test]
    fn test_png_never_grows_and_stays_decodable() {
        let original = sample_png();
        let asset = Asset::new("app/img/a.png", "a.png", original.clone());

        let out = OptimizeImages::new(7).unwrap().apply(asset).unwrap();
        assert!(out.contents.len() <= original.len());

        let decoded = image::load_from_memory(&out.contents).unwrap();
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 64);
    }

    #[test]
    fn test_non_png_passes_through() {
        let asset = Asset::new("app/img/logo.svg", "logo.svg", b"<svg/>".to_vec());
        let out = OptimizeImages::new(5).unwrap().apply(asset).unwrap();
        assert_eq!(out.contents, b"<svg/>");
    }

    #[test]
    fn test_corrupt_png_fails() {
        let asset = Asset::new("app/img/bad.png", "bad.png", b"not a png".to_vec());
        assert!(OptimizeImages::new(5).unwrap().apply(asset).is_err());
    }
}
