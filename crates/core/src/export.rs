//! Packaging an imageset into `<root>/<imageset>.zip`.
//!
//! Captions are dumped to sidecars, concept folders are copied into the
//! staging directory as `{src|reg}/<repeat>_<name>/`, and the staging tree
//! is compressed. Stale archives and staging state are purged before and
//! after every run, so a crashed export leaves nothing a rerun trips on.

use crate::caption::CaptionRead;
use crate::error::IoContext;
use crate::store::ConceptStore;
use crate::{Error, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use storage::layout::ARCHIVE_EXT;
use storage::{RepoLayout, SubsetKind};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

impl ConceptStore {
    pub fn export_archive(&self, imageset: &str) -> Result<PathBuf> {
        self.require_imageset(imageset)?;
        let archive = self.layout.archive_path(imageset)?;
        let staging = self.layout.staging_dir();
        self.purge_export_state()?;

        let result = self.stage_and_pack(imageset, &staging, &archive);
        if let Err(err) = remove_dir_if_present(&staging) {
            warn!(path = %staging.display(), error = %err, "staging directory left behind");
        }
        if result.is_err() {
            let _ = fs::remove_file(&archive);
        }
        result?;
        info!(imageset, archive = %archive.display(), "imageset exported");
        Ok(archive)
    }

    fn stage_and_pack(&self, imageset: &str, staging: &Path, archive: &Path) -> Result<()> {
        fs::create_dir_all(staging).at(staging)?;
        for kind in SubsetKind::ALL {
            let subset = self.layout.resolve(&RepoLayout::subset_rel(imageset, kind)?)?;
            if !subset.is_dir() {
                continue;
            }
            let staged_subset = staging.join(kind.dir_name());
            fs::create_dir_all(&staged_subset).at(&staged_subset)?;
            for concept in self.list_concepts(imageset, kind)? {
                self.dump_captions(&concept.path)?;
                let from = self.layout.resolve(&concept.path)?;
                copy_tree(&from, &staged_subset.join(&concept.folder))?;
            }
        }
        pack_dir(staging, archive)
    }

    /// Writes each image's current caption to its sidecar. When the embedded
    /// caption cannot be read the existing sidecar is the better copy and is
    /// kept; an image with neither gets an empty one.
    fn dump_captions(&self, concept_rel: &str) -> Result<()> {
        for rel in self.list_images(concept_rel)? {
            let image = self.layout.resolve(&rel)?;
            match self.captions.read(&image) {
                CaptionRead::Tokens(tokens) => self.captions.write_sidecar(&image, &tokens)?,
                CaptionRead::Unavailable { cause } => {
                    if self.captions.read_sidecar(&image).is_none() {
                        self.captions.write_sidecar(&image, &[])?;
                    }
                    debug!(%rel, %cause, "caption kept from sidecar");
                }
            }
        }
        Ok(())
    }

    /// Removes every archive at the repository root and the staging tree.
    fn purge_export_state(&self) -> Result<()> {
        remove_dir_if_present(&self.layout.staging_dir())?;
        let root = self.layout.root();
        for entry in fs::read_dir(root).at(root)? {
            let path = entry.at(root)?.path();
            let is_archive = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(ARCHIVE_EXT))
                .unwrap_or(false);
            if is_archive && path.is_file() {
                fs::remove_file(&path).at(&path)?;
                debug!(path = %path.display(), "stale archive removed");
            }
        }
        Ok(())
    }
}

fn remove_dir_if_present(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).at(dir),
    }
}

fn walk_error(root: &Path, err: walkdir::Error) -> Error {
    let path = err.path().unwrap_or(root).to_path_buf();
    Error::Io {
        path,
        source: err.into(),
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|e| walk_error(from, e))?;
        let rel = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let target = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).at(&target)?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target).at(entry.path())?;
        }
    }
    Ok(())
}

fn pack_dir(dir: &Path, archive: &Path) -> Result<()> {
    let file = File::create(archive).at(archive)?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_error(dir, e))?;
        let name = entry
            .path()
            .strip_prefix(dir)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options)?;
            let mut source = File::open(entry.path()).at(entry.path())?;
            io::copy(&mut source, &mut zip).at(entry.path())?;
        }
    }
    zip.finish()?;
    Ok(())
}
