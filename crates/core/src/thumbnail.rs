//! Derived preview artifacts mirrored under `<root>/.thumbnail/`.
//!
//! An artifact is only ever created from the current source or deleted;
//! it is never updated in place. Every mutation of a source image or its
//! location must call [`ThumbnailCache::invalidate`], and the next
//! [`ThumbnailCache::get`] regenerates it.
//!
//! The artifact path mirrors the source path, extension included. JPEG and
//! BMP sources get artifacts in their own format; every other source gets
//! PNG bytes under its original extension, so consumers must sniff the
//! content rather than trust the name.

use crate::config::ThumbnailConfig;
use crate::decode::open_image;
use crate::error::IoContext;
use crate::{Error, Result};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::fs;
use std::path::{Path, PathBuf};
use storage::{normalize_rel, RepoLayout};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ThumbnailCache {
    layout: RepoLayout,
    max_width: u32,
    max_height: u32,
}

impl ThumbnailCache {
    pub fn new(layout: RepoLayout, cfg: &ThumbnailConfig) -> Self {
        Self {
            layout,
            max_width: cfg.max_width.max(1),
            max_height: cfg.max_height.max(1),
        }
    }

    /// Path of the artifact for `rel`, generating it from the source first
    /// when it is not cached.
    pub fn get(&self, rel: &str) -> Result<PathBuf> {
        let rel = normalize_rel(rel)?;
        let thumb = self.layout.thumbnail_path(&rel)?;
        if thumb.is_file() {
            debug!(%rel, "thumbnail hit");
            return Ok(thumb);
        }

        let source = self.layout.resolve(&rel)?;
        if !source.is_file() {
            return Err(Error::NotFound(rel));
        }
        let img = open_image(&source)?;
        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
        let (w, h) = fit_within(rgb.width(), rgb.height(), self.max_width, self.max_height);
        let small = if (w, h) == (rgb.width(), rgb.height()) {
            rgb
        } else {
            rgb.resize_exact(w, h, FilterType::Lanczos3)
        };

        let parent = thumb
            .parent()
            .ok_or_else(|| Error::InvalidInput(format!("no thumbnail folder for {}", rel)))?;
        fs::create_dir_all(parent).at(parent)?;
        // Concurrent generators each write a private file; the last rename wins.
        let tmp = tempfile::Builder::new()
            .prefix(".partial-")
            .tempfile_in(parent)
            .at(parent)?;
        small.save_with_format(tmp.path(), thumbnail_format(&thumb))?;
        tmp.persist(&thumb).map_err(|e| e.error).at(&thumb)?;
        debug!(%rel, width = w, height = h, "thumbnail generated");
        Ok(thumb)
    }

    pub fn read(&self, rel: &str) -> Result<Vec<u8>> {
        let path = self.get(rel)?;
        fs::read(&path).at(&path)
    }

    /// Deletes the artifact (or the whole mirrored subtree) for `rel`.
    /// Returns whether anything was removed.
    pub fn invalidate(&self, rel: &str) -> Result<bool> {
        let target = self.layout.thumbnail_path(rel)?;
        remove_any(&target)
    }

    /// Best-effort variant for batch loops: a failure is logged, not raised.
    pub fn invalidate_quiet(&self, rel: &str) -> bool {
        match self.invalidate(rel) {
            Ok(removed) => removed,
            Err(err) => {
                warn!(%rel, error = %err, "thumbnail invalidation failed");
                false
            }
        }
    }
}

fn remove_any(target: &Path) -> Result<bool> {
    let meta = match fs::symlink_metadata(target) {
        Ok(meta) => meta,
        Err(_) => return Ok(false),
    };
    if meta.is_dir() {
        fs::remove_dir_all(target).at(target)?;
    } else {
        fs::remove_file(target).at(target)?;
    }
    debug!(path = %target.display(), "thumbnail invalidated");
    Ok(true)
}

/// Largest size with the source aspect ratio that fits the box. Never upscales.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let scale = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_width);
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_height);
    (w, h)
}

/// Encoder for the artifact at `path`: JPEG and BMP keep their format,
/// everything else is written as PNG.
fn thumbnail_format(path: &Path) -> ImageFormat {
    match ImageFormat::from_path(path) {
        Ok(ImageFormat::Jpeg) => ImageFormat::Jpeg,
        Ok(ImageFormat::Bmp) => ImageFormat::Bmp,
        _ => ImageFormat::Png,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_box_preserving_aspect() {
        assert_eq!(fit_within(1024, 1024, 256, 512), (256, 256));
        assert_eq!(fit_within(300, 2000, 256, 512), (77, 512));
        assert_eq!(fit_within(2000, 300, 256, 512), (256, 38));
    }

    #[test]
    fn never_upscales() {
        assert_eq!(fit_within(100, 40, 256, 512), (100, 40));
        assert_eq!(fit_within(256, 512, 256, 512), (256, 512));
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(thumbnail_format(Path::new("a/000001.jpeg")), ImageFormat::Jpeg);
        assert_eq!(thumbnail_format(Path::new("a/000001.JPG")), ImageFormat::Jpeg);
        assert_eq!(thumbnail_format(Path::new("a/000001.webp")), ImageFormat::Png);
    }
}
