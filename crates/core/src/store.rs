//! Filesystem-backed dataset store: imageset -> subset -> concept -> image.
//!
//! Every call goes to disk; the store keeps no directory state between
//! calls, so it is safe to restart at any point. Structural changes to a
//! single folder raise on failure; per-image batches never abort early and
//! report what went through.

use crate::caption::CaptionStore;
use crate::config::{AppConfig, OutputFormat};
use crate::decode::image_dimensions;
use crate::error::IoContext;
use crate::models::{
    BatchReport, Concept, ConceptDetail, ConceptOverview, ImageRecord, ImagesetOverview,
    SubsetDetail, SubsetOverview,
};
use crate::sequence::FolderLocks;
use crate::thumbnail::ThumbnailCache;
use crate::{Error, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use storage::{codec, normalize_rel, ConceptFolder, RepoLayout, SubsetKind};
use tracing::{info, warn};

/// Raster extensions recognized as images, matched case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp"];

pub struct ConceptStore {
    pub(crate) layout: RepoLayout,
    pub(crate) output: OutputFormat,
    pub(crate) thumbnails: ThumbnailCache,
    pub(crate) captions: CaptionStore,
    pub(crate) locks: FolderLocks,
    image_globs: GlobSet,
}

impl ConceptStore {
    pub fn new(cfg: &AppConfig) -> Result<Self> {
        let root = PathBuf::from(&cfg.repo.root);
        fs::create_dir_all(&root).at(&root)?;
        let layout = RepoLayout::new(root);
        Ok(Self {
            thumbnails: ThumbnailCache::new(layout.clone(), &cfg.thumbnail),
            layout,
            output: cfg.image.output_format,
            captions: CaptionStore::new(),
            locks: FolderLocks::new(),
            image_globs: build_image_globs()?,
        })
    }

    pub fn layout(&self) -> &RepoLayout {
        &self.layout
    }

    pub fn thumbnails(&self) -> &ThumbnailCache {
        &self.thumbnails
    }

    pub fn captions(&self) -> &CaptionStore {
        &self.captions
    }

    pub fn is_image_name(&self, file_name: &str) -> bool {
        self.image_globs.is_match(file_name)
    }

    // ---- imagesets ----

    pub fn list_imagesets(&self) -> Result<Vec<String>> {
        let root = self.layout.root();
        let mut names = Vec::new();
        for entry in fs::read_dir(root).at(root)? {
            let entry = entry.at(root)?;
            if !entry.file_type().at(&entry.path())?.is_dir() {
                continue;
            }
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_str().and_then(RepoLayout::imageset_name) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn create_imageset(&self, name: &str) -> Result<String> {
        let rel = RepoLayout::imageset_rel(name)?;
        let dir = self.layout.resolve(&rel)?;
        if dir.exists() {
            return Err(Error::AlreadyExists(format!("imageset {}", name)));
        }
        fs::create_dir(&dir).at(&dir)?;
        info!(imageset = name, "imageset created");
        Ok(name.to_string())
    }

    pub fn rename_imageset(&self, from: &str, to: &str) -> Result<String> {
        let old_rel = RepoLayout::imageset_rel(from)?;
        let new_rel = RepoLayout::imageset_rel(to)?;
        self.rename_folder(&old_rel, &new_rel)?;
        info!(from, to, "imageset renamed");
        Ok(to.to_string())
    }

    pub fn delete_imageset(&self, name: &str) -> Result<()> {
        self.delete_tree(&RepoLayout::imageset_rel(name)?)
    }

    pub fn delete_subset(&self, imageset: &str, kind: SubsetKind) -> Result<()> {
        self.delete_tree(&RepoLayout::subset_rel(imageset, kind)?)
    }

    pub(crate) fn require_imageset(&self, name: &str) -> Result<PathBuf> {
        let dir = self.layout.resolve(&RepoLayout::imageset_rel(name)?)?;
        if !dir.is_dir() {
            return Err(Error::NotFound(format!("imageset {}", name)));
        }
        Ok(dir)
    }

    // ---- concepts ----

    /// Concept folders of a subset. Entries not matching `<repeat>_<name>`
    /// are skipped. A subset that was never created has no concepts.
    pub fn list_concepts(&self, imageset: &str, kind: SubsetKind) -> Result<Vec<Concept>> {
        self.require_imageset(imageset)?;
        let subset_rel = RepoLayout::subset_rel(imageset, kind)?;
        let dir = self.layout.resolve(&subset_rel)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut concepts = Vec::new();
        for entry in fs::read_dir(&dir).at(&dir)? {
            let entry = entry.at(&dir)?;
            if !entry.file_type().at(&entry.path())?.is_dir() {
                continue;
            }
            let Some(folder) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if let Some(decoded) = codec::decode(&folder) {
                concepts.push(Concept {
                    name: decoded.name,
                    repeat: decoded.repeat,
                    path: format!("{}/{}", subset_rel, folder),
                    folder,
                });
            }
        }
        concepts.sort_by(|a, b| a.folder.cmp(&b.folder));
        Ok(concepts)
    }

    pub fn rename_concept(
        &self,
        imageset: &str,
        kind: SubsetKind,
        from: &ConceptFolder,
        to: &ConceptFolder,
    ) -> Result<ConceptFolder> {
        let old_rel = RepoLayout::concept_rel(imageset, kind, from.repeat, &from.name)?;
        let new_rel = RepoLayout::concept_rel(imageset, kind, to.repeat, to.name.trim())?;
        self.rename_folder(&old_rel, &new_rel)?;
        info!(from = %old_rel, to = %new_rel, "concept renamed");
        Ok(ConceptFolder::new(to.repeat, to.name.trim()))
    }

    pub fn delete_concept(&self, imageset: &str, kind: SubsetKind, folder: &str) -> Result<()> {
        self.delete_tree(&RepoLayout::concept_folder_rel(imageset, kind, folder)?)
    }

    // ---- images ----

    /// Image files directly inside a concept folder, as sorted
    /// repository-relative paths.
    pub fn list_images(&self, concept_rel: &str) -> Result<Vec<String>> {
        let concept_rel = normalize_rel(concept_rel)?;
        let dir = self.layout.resolve(&concept_rel)?;
        if !dir.is_dir() {
            return Err(Error::NotFound(concept_rel));
        }
        let mut images = Vec::new();
        for entry in fs::read_dir(&dir).at(&dir)? {
            let entry = entry.at(&dir)?;
            if !entry.file_type().at(&entry.path())?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if self.is_image_name(name) {
                    images.push(format!("{}/{}", concept_rel, name));
                }
            }
        }
        images.sort();
        Ok(images)
    }

    /// Removes each image with its thumbnail and caption sidecar. Missing or
    /// undeletable files are reported as failures; the rest still go.
    pub fn delete_images(&self, paths: &[String]) -> BatchReport<String> {
        let mut report = BatchReport::new();
        for path in paths {
            let rel = match self.image_rel(path) {
                Ok(rel) => rel,
                Err(err) => {
                    report.fail(path.as_str(), err);
                    continue;
                }
            };
            self.thumbnails.invalidate_quiet(&rel);
            let source = match self.layout.resolve(&rel) {
                Ok(p) => p,
                Err(err) => {
                    report.fail(rel, err);
                    continue;
                }
            };
            if !source.is_file() {
                report.fail(rel, "no such image");
                continue;
            }
            if let Err(err) = fs::remove_file(&source) {
                report.fail(rel, err);
                continue;
            }
            let sidecar = CaptionStore::sidecar_path(&source);
            if sidecar.is_file() {
                if let Err(err) = fs::remove_file(&sidecar) {
                    warn!(path = %sidecar.display(), error = %err, "caption sidecar left behind");
                }
            }
            report.ok(rel);
        }
        info!(deleted = report.count(), failed = report.failures.len(), "images deleted");
        report
    }

    pub fn image_record(&self, rel: &str) -> Result<ImageRecord> {
        let rel = normalize_rel(rel)?;
        let abs = self.layout.resolve(&rel)?;
        let meta = fs::metadata(&abs).at(&abs)?;
        if !meta.is_file() {
            return Err(Error::NotFound(rel));
        }
        let lossy = |s: Option<&std::ffi::OsStr>| {
            s.map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
        };
        let basename = lossy(abs.file_name());
        let stem = lossy(abs.file_stem());
        let extension = lossy(abs.extension());
        let dims = image_dimensions(&abs).ok();
        let concept = concept_of(&rel);
        Ok(ImageRecord {
            basename,
            stem,
            extension,
            size: meta.len(),
            width: dims.map(|d| d.0),
            height: dims.map(|d| d.1),
            captions: self.captions.load(&abs),
            concept: concept.as_ref().map(|c| c.name.clone()),
            repeat: concept.map(|c| c.repeat),
            path: rel,
        })
    }

    pub fn thumbnail(&self, rel: &str) -> Result<PathBuf> {
        self.thumbnails.get(rel)
    }

    // ---- captions ----

    pub fn load_caption(&self, rel: &str) -> Result<Vec<String>> {
        let abs = self.existing_image(rel)?;
        Ok(self.captions.load(&abs))
    }

    pub fn save_caption(&self, rel: &str, tokens: &[String]) -> Result<()> {
        let abs = self.existing_image(rel)?;
        self.captions.save(&abs, tokens)
    }

    pub fn merge_caption(&self, rel: &str, tokens: &[String]) -> Result<Vec<String>> {
        let abs = self.existing_image(rel)?;
        self.captions.merge(&abs, tokens)
    }

    pub fn save_captions(&self, captions: &BTreeMap<String, Vec<String>>) -> BatchReport<String> {
        let mut report = BatchReport::new();
        for (rel, tokens) in captions {
            match self.save_caption(rel, tokens) {
                Ok(()) => report.ok(rel.clone()),
                Err(err) => report.fail(rel.as_str(), err),
            }
        }
        report
    }

    /// Normalized `imageset-x/<subset>/<repeat>_<name>/<file>` path of an
    /// image. Sidecars, thumbnails and files outside a concept are rejected.
    pub(crate) fn image_rel(&self, rel: &str) -> Result<String> {
        let rel = normalize_rel(rel)?;
        let parts: Vec<&str> = rel.split('/').collect();
        let valid = match parts.as_slice() {
            [set, subset, folder, file] => {
                RepoLayout::imageset_name(set).is_some()
                    && SubsetKind::ALL.iter().any(|k| k.dir_name() == *subset)
                    && codec::decode(folder).is_some()
                    && self.is_image_name(file)
            }
            _ => false,
        };
        if !valid {
            return Err(Error::InvalidInput(format!("{} is not a concept image", rel)));
        }
        Ok(rel)
    }

    pub(crate) fn existing_image(&self, rel: &str) -> Result<PathBuf> {
        let rel = self.image_rel(rel)?;
        let abs = self.layout.resolve(&rel)?;
        if !abs.is_file() {
            return Err(Error::NotFound(rel));
        }
        Ok(abs)
    }

    // ---- read models ----

    pub fn load_concept(
        &self,
        imageset: &str,
        kind: SubsetKind,
        name: &str,
        repeat: u32,
    ) -> Result<ConceptDetail> {
        let rel = RepoLayout::concept_rel(imageset, kind, repeat, name)?;
        let images = self.list_images(&rel)?;
        Ok(ConceptDetail {
            imageset: imageset.to_string(),
            kind,
            name: name.to_string(),
            repeat,
            images: self.records(&images),
        })
    }

    pub fn load_subset(&self, imageset: &str, kind: SubsetKind) -> Result<SubsetDetail> {
        let concepts = self.list_concepts(imageset, kind)?;
        let mut images = Vec::new();
        for concept in &concepts {
            images.extend(self.records(&self.list_images(&concept.path)?));
        }
        Ok(SubsetDetail {
            imageset: imageset.to_string(),
            kind,
            concepts,
            images,
        })
    }

    pub fn overview(&self, imageset: &str) -> Result<ImagesetOverview> {
        self.require_imageset(imageset)?;
        let mut overview = ImagesetOverview {
            name: imageset.to_string(),
            train: None,
            regular: None,
        };
        for kind in SubsetKind::ALL {
            let dir = self.layout.resolve(&RepoLayout::subset_rel(imageset, kind)?)?;
            if !dir.is_dir() {
                continue;
            }
            let mut subset = SubsetOverview::default();
            for concept in self.list_concepts(imageset, kind)? {
                let images = self.list_images(&concept.path)?;
                subset.image_count += images.len();
                subset.total_repeat += concept.repeat as u64 * images.len() as u64;
                subset.concepts.push(ConceptOverview {
                    name: concept.name,
                    repeat: concept.repeat,
                    cover: images.first().cloned(),
                    image_count: images.len(),
                });
            }
            match kind {
                SubsetKind::Train => overview.train = Some(subset),
                SubsetKind::Regular => overview.regular = Some(subset),
            }
        }
        Ok(overview)
    }

    /// Records for each path; an unreadable entry is logged and left out.
    fn records(&self, paths: &[String]) -> Vec<ImageRecord> {
        paths
            .iter()
            .filter_map(|p| match self.image_record(p) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!(path = %p, error = %err, "image record skipped");
                    None
                }
            })
            .collect()
    }

    // ---- shared helpers ----

    /// Renames a folder. The old thumbnail subtree is dropped rather than
    /// moved; artifacts regenerate on demand.
    fn rename_folder(&self, old_rel: &str, new_rel: &str) -> Result<()> {
        let old = self.layout.resolve(old_rel)?;
        let new = self.layout.resolve(new_rel)?;
        if !old.is_dir() {
            return Err(Error::NotFound(old_rel.to_string()));
        }
        if new.exists() {
            return Err(Error::Conflict(format!("{} already exists", new_rel)));
        }
        self.thumbnails.invalidate(old_rel)?;
        self.thumbnails.invalidate_quiet(new_rel);
        fs::rename(&old, &new).at(&old)
    }

    /// Thumbnail mirror first (best effort), then the source tree.
    fn delete_tree(&self, rel: &str) -> Result<()> {
        self.thumbnails.invalidate_quiet(rel);
        let dir = self.layout.resolve(rel)?;
        if !dir.exists() {
            return Err(Error::NotFound(rel.to_string()));
        }
        fs::remove_dir_all(&dir).at(&dir)?;
        info!(path = %rel, "deleted");
        Ok(())
    }
}

/// Concept of an image path `imageset-x/<subset>/<repeat>_<name>/<file>`.
pub fn concept_of(rel: &str) -> Option<ConceptFolder> {
    let mut parts = rel.rsplit('/');
    parts.next()?;
    codec::decode(parts.next()?)
}

fn build_image_globs() -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for ext in IMAGE_EXTENSIONS {
        let glob = GlobBuilder::new(&format!("*.{}", ext))
            .case_insensitive(true)
            .literal_separator(true)
            .build()
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::InvalidInput(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concept_of_reads_parent_folder() {
        let c = concept_of("imageset-a/src/8_katana/000001.jpeg").unwrap();
        assert_eq!(c, ConceptFolder::new(8, "katana"));
        assert!(concept_of("imageset-a/src/loose/000001.jpeg").is_none());
        assert!(concept_of("000001.jpeg").is_none());
    }

    #[test]
    fn image_globs_are_case_insensitive() {
        let globs = build_image_globs().unwrap();
        for name in ["a.jpg", "b.JPEG", "c.Png", "d.gif", "e.bmp", "f.TIFF", "g.tif", "h.webp"] {
            assert!(globs.is_match(name), "{name}");
        }
        for name in ["a.txt", "b.jpg.txt", "c", "d.svg"] {
            assert!(!globs.is_match(name), "{name}");
        }
    }
}
