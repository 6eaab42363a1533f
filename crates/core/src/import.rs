//! Writing images into concept folders: bulk import from a directory, an
//! explicit file list, moves between concepts, and in-place renumbering.
//!
//! Each entry point takes the destination folder's lock for the whole
//! batch, so index allocation and the writes it covers never interleave
//! with another writer on the same folder.

use crate::caption::CaptionStore;
use crate::config::OutputFormat;
use crate::decode::open_image;
use crate::error::IoContext;
use crate::models::{BatchReport, MovedImage};
use crate::sequence::{format_index, hold, Allocator};
use crate::store::ConceptStore;
use crate::{Error, Result};
use image::DynamicImage;
use std::fs;
use std::path::{Path, PathBuf};
use storage::{RepoLayout, SubsetKind};
use tracing::{debug, info, warn};

impl ConceptStore {
    /// Creates the concept folder if needed and imports every image found
    /// directly in `source_dir`. Returns how many were imported; unreadable
    /// files are skipped. A missing `source_dir` imports nothing.
    pub fn add_concept(
        &self,
        imageset: &str,
        kind: SubsetKind,
        name: &str,
        repeat: u32,
        source_dir: &Path,
    ) -> Result<usize> {
        self.require_imageset(imageset)?;
        let concept_rel = RepoLayout::concept_rel(imageset, kind, repeat, name.trim())?;
        let dest = self.layout.resolve(&concept_rel)?;
        fs::create_dir_all(&dest).at(&dest)?;
        if !source_dir.is_dir() {
            warn!(source = %source_dir.display(), "import source missing, concept left empty");
            return Ok(0);
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(source_dir).at(source_dir)? {
            let entry = entry.at(source_dir)?;
            let path = entry.path();
            let is_image = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| self.is_image_name(n))
                .unwrap_or(false);
            if is_image && path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        let report = self.import_into(&concept_rel, &files)?;
        info!(
            concept = %concept_rel,
            imported = report.count(),
            skipped = report.failures.len(),
            "concept populated"
        );
        Ok(report.count())
    }

    /// Imports a caller-supplied list of files into an existing-or-new
    /// concept folder (identified by its folder name).
    pub fn import_files(
        &self,
        imageset: &str,
        kind: SubsetKind,
        folder: &str,
        files: &[PathBuf],
    ) -> Result<BatchReport<String>> {
        self.require_imageset(imageset)?;
        let concept_rel = RepoLayout::concept_folder_rel(imageset, kind, folder)?;
        let dest = self.layout.resolve(&concept_rel)?;
        fs::create_dir_all(&dest).at(&dest)?;
        let report = self.import_into(&concept_rel, files)?;
        info!(concept = %concept_rel, imported = report.count(), "files imported");
        Ok(report)
    }

    fn import_into(&self, concept_rel: &str, files: &[PathBuf]) -> Result<BatchReport<String>> {
        let dest = self.layout.resolve(concept_rel)?;
        let lock = self.locks.lock_for(&dest);
        let _guard = hold(&lock);
        let mut alloc = Allocator::for_dir(&dest, files.len())?;
        let mut report = BatchReport::new();
        for file in files {
            let img = match open_image(file) {
                Ok(img) => img,
                Err(err) => {
                    report.fail(file.display().to_string(), err);
                    continue;
                }
            };
            let index = match alloc.next_index() {
                Ok(index) => index,
                Err(err) => {
                    report.fail(file.display().to_string(), err);
                    continue;
                }
            };
            let name = format_index(index, self.output.extension());
            let rel = format!("{}/{}", concept_rel, name);
            match write_converted(img, &dest.join(&name), self.output) {
                Ok(()) => {
                    self.thumbnails.invalidate_quiet(&rel);
                    debug!(source = %file.display(), target = %rel, "imported");
                    report.ok(rel);
                }
                Err(err) => report.fail(file.display().to_string(), err),
            }
        }
        Ok(report)
    }

    /// Moves images into the destination concept under fresh indices. The
    /// file keeps its own format; the caption sidecar travels with it and
    /// the old thumbnail is dropped.
    pub fn move_images(
        &self,
        paths: &[String],
        imageset: &str,
        kind: SubsetKind,
        name: &str,
        repeat: u32,
    ) -> Result<BatchReport<MovedImage>> {
        self.require_imageset(imageset)?;
        let concept_rel = RepoLayout::concept_rel(imageset, kind, repeat, name.trim())?;
        let dest = self.layout.resolve(&concept_rel)?;
        fs::create_dir_all(&dest).at(&dest)?;

        let lock = self.locks.lock_for(&dest);
        let _guard = hold(&lock);
        let mut alloc = Allocator::for_dir(&dest, paths.len())?;
        let mut report = BatchReport::new();
        for path in paths {
            match self.move_one(path, &concept_rel, &dest, &mut alloc) {
                Ok(moved) => report.ok(moved),
                Err(err) => report.fail(path.as_str(), err),
            }
        }
        info!(concept = %concept_rel, moved = report.count(), "images moved");
        Ok(report)
    }

    fn move_one(
        &self,
        path: &str,
        concept_rel: &str,
        dest: &Path,
        alloc: &mut Allocator,
    ) -> Result<MovedImage> {
        let from = self.image_rel(path)?;
        let source = self.existing_image(&from)?;
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| self.output.extension().to_string());
        let name = format_index(alloc.next_index()?, &ext);
        let target = dest.join(&name);
        let to = format!("{}/{}", concept_rel, name);

        self.thumbnails.invalidate_quiet(&from);
        move_file(&source, &target)?;
        let old_sidecar = CaptionStore::sidecar_path(&source);
        if old_sidecar.is_file() {
            let new_sidecar = CaptionStore::sidecar_path(&target);
            if let Err(err) = move_file(&old_sidecar, &new_sidecar) {
                warn!(path = %old_sidecar.display(), error = %err, "caption sidecar not moved");
            }
        }
        self.thumbnails.invalidate_quiet(&to);
        debug!(%from, %to, "moved");
        Ok(MovedImage { from, to })
    }

    /// Re-encodes every image of a concept to the configured format under
    /// freshly allocated names, carrying captions over.
    pub fn renumber_concept(
        &self,
        imageset: &str,
        kind: SubsetKind,
        folder: &str,
    ) -> Result<BatchReport<String>> {
        let concept_rel = RepoLayout::concept_folder_rel(imageset, kind, folder)?;
        let images = self.list_images(&concept_rel)?;
        self.thumbnails.invalidate(&concept_rel)?;

        let dest = self.layout.resolve(&concept_rel)?;
        let lock = self.locks.lock_for(&dest);
        let _guard = hold(&lock);
        let mut alloc = Allocator::for_dir(&dest, images.len())?;
        let mut report = BatchReport::new();
        for rel in &images {
            match self.renumber_one(rel, &concept_rel, &dest, &mut alloc) {
                Ok(new_rel) => report.ok(new_rel),
                Err(err) => report.fail(rel.as_str(), err),
            }
        }
        info!(concept = %concept_rel, renumbered = report.count(), "concept renumbered");
        Ok(report)
    }

    fn renumber_one(
        &self,
        rel: &str,
        concept_rel: &str,
        dest: &Path,
        alloc: &mut Allocator,
    ) -> Result<String> {
        let source = self.layout.resolve(rel)?;
        let tokens = self.captions.load(&source);
        let img = open_image(&source)?;
        let name = format_index(alloc.next_index()?, self.output.extension());
        let target = dest.join(&name);
        write_converted(img, &target, self.output)?;
        if let Err(err) = self
            .captions
            .save(&target, &tokens)
            .and_then(|()| fs::remove_file(&source).at(&source))
        {
            discard_copy(&target);
            return Err(err);
        }

        let old_sidecar = CaptionStore::sidecar_path(&source);
        if old_sidecar != CaptionStore::sidecar_path(&target) && old_sidecar.is_file() {
            if let Err(err) = fs::remove_file(&old_sidecar) {
                warn!(path = %old_sidecar.display(), error = %err, "stale caption sidecar left behind");
            }
        }
        Ok(format!("{}/{}", concept_rel, name))
    }
}

/// Encodes `img` with the configured codec. Lossy targets have no alpha
/// channel, so the image is flattened to RGB first.
pub(crate) fn write_converted(img: DynamicImage, target: &Path, format: OutputFormat) -> Result<()> {
    let img = if format.is_lossy() {
        DynamicImage::ImageRgb8(img.to_rgb8())
    } else {
        img
    };
    if target.exists() {
        return Err(Error::Conflict(format!("{} already exists", target.display())));
    }
    img.save_with_format(target, format.image_format())?;
    Ok(())
}

/// Removes a half-finished renumbered copy so the source stays the only one.
fn discard_copy(target: &Path) {
    for path in [CaptionStore::sidecar_path(target), target.to_path_buf()] {
        if let Err(err) = fs::remove_file(&path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %err, "renumbered copy left behind");
            }
        }
    }
}

/// Rename, falling back to copy and delete across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if to.exists() {
        return Err(Error::Conflict(format!("{} already exists", to.display())));
    }
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).at(from)?;
    fs::remove_file(from).at(from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discarded_copy_takes_its_sidecar_along() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("000004.jpeg");
        fs::write(&target, b"x").unwrap();
        fs::write(dir.path().join("000004.txt"), "a, b").unwrap();
        fs::write(dir.path().join("000001.jpeg"), b"x").unwrap();

        discard_copy(&target);
        assert!(!target.exists());
        assert!(!dir.path().join("000004.txt").exists());
        assert!(dir.path().join("000001.jpeg").exists());

        // nothing left to remove is fine
        discard_copy(&target);
    }

    #[test]
    fn existing_target_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("000000.png");
        fs::write(&target, b"x").unwrap();
        let img = DynamicImage::new_rgb8(2, 2);
        assert!(matches!(
            write_converted(img, &target, OutputFormat::Png),
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            move_file(&dir.path().join("missing.png"), &target),
            Err(Error::Conflict(_))
        ));
    }
}
