//! Repository layout:
//!
//! ```text
//! <root>/imageset-<name>/{src|reg}/<repeat>_<concept>/<NNNNNN>.<ext>
//! <root>/.thumbnail/<same relative path>
//! ```
//!
//! Relative paths handed around the workspace always start at the imageset
//! folder and use forward slashes.

use crate::codec;
use crate::LayoutError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const IMAGESET_PREFIX: &str = "imageset-";
pub const THUMBNAIL_DIR: &str = ".thumbnail";
pub const STAGING_DIR: &str = ".temp";
pub const ARCHIVE_EXT: &str = "zip";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubsetKind {
    Train,
    Regular,
}

impl SubsetKind {
    pub const ALL: [SubsetKind; 2] = [SubsetKind::Train, SubsetKind::Regular];

    pub fn dir_name(self) -> &'static str {
        match self {
            SubsetKind::Train => "src",
            SubsetKind::Regular => "reg",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SubsetKind::Train => "train",
            SubsetKind::Regular => "regular",
        }
    }
}

impl fmt::Display for SubsetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SubsetKind {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "train" | "src" => Ok(SubsetKind::Train),
            "regular" | "reg" => Ok(SubsetKind::Regular),
            _ => Err(LayoutError::UnknownSubset(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RepoLayout {
    root: PathBuf,
}

impl RepoLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn thumbnail_root(&self) -> PathBuf {
        self.root.join(THUMBNAIL_DIR)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    pub fn archive_path(&self, imageset: &str) -> Result<PathBuf, LayoutError> {
        validate_segment(imageset)?;
        Ok(self.root.join(format!("{}.{}", imageset, ARCHIVE_EXT)))
    }

    /// Strips the imageset marker from a top-level entry name.
    pub fn imageset_name(entry: &str) -> Option<&str> {
        entry
            .strip_prefix(IMAGESET_PREFIX)
            .filter(|name| !name.is_empty())
    }

    pub fn imageset_rel(imageset: &str) -> Result<String, LayoutError> {
        validate_segment(imageset)?;
        Ok(format!("{}{}", IMAGESET_PREFIX, imageset))
    }

    pub fn subset_rel(imageset: &str, kind: SubsetKind) -> Result<String, LayoutError> {
        Ok(format!("{}/{}", Self::imageset_rel(imageset)?, kind.dir_name()))
    }

    pub fn concept_rel(
        imageset: &str,
        kind: SubsetKind,
        repeat: u32,
        name: &str,
    ) -> Result<String, LayoutError> {
        let folder = codec::encode(repeat, name)?;
        Self::concept_folder_rel(imageset, kind, &folder)
    }

    pub fn concept_folder_rel(
        imageset: &str,
        kind: SubsetKind,
        folder: &str,
    ) -> Result<String, LayoutError> {
        validate_segment(folder)?;
        Ok(format!("{}/{}", Self::subset_rel(imageset, kind)?, folder))
    }

    /// Absolute location of a repository-relative path.
    pub fn resolve(&self, rel: &str) -> Result<PathBuf, LayoutError> {
        Ok(self.root.join(normalize_rel(rel)?))
    }

    /// Mirrored location of a repository-relative path under the thumbnail root.
    pub fn thumbnail_path(&self, rel: &str) -> Result<PathBuf, LayoutError> {
        Ok(self.thumbnail_root().join(normalize_rel(rel)?))
    }

    /// Inverse of [`RepoLayout::resolve`] for paths inside the root.
    pub fn relativize(&self, abs: &Path) -> Option<String> {
        let rel = abs.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }
}

/// Normalizes a caller-supplied relative path to forward slashes, rejecting
/// absolute paths and parent traversal.
pub fn normalize_rel(rel: &str) -> Result<String, LayoutError> {
    let unified = rel.replace('\\', "/");
    if unified.starts_with('/') || Path::new(rel).is_absolute() {
        return Err(LayoutError::InvalidPath(rel.to_string()));
    }
    let mut parts = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => continue,
            ".." => return Err(LayoutError::InvalidPath(rel.to_string())),
            p => parts.push(p),
        }
    }
    if parts.is_empty() {
        return Err(LayoutError::InvalidPath(rel.to_string()));
    }
    Ok(parts.join("/"))
}

/// A single path segment: non-empty, no separators, not a dot entry.
pub fn validate_segment(name: &str) -> Result<(), LayoutError> {
    if name.trim().is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name == "."
        || name == ".."
    {
        return Err(LayoutError::InvalidName(name.to_string()));
    }
    Ok(())
}
