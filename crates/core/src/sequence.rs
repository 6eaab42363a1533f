//! Sequential six-digit file numbering inside a concept folder.

use crate::error::IoContext;
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Numeric stem of a file name, if it has one (`000012.jpeg` -> 12).
pub fn parse_index(file_name: &str) -> Option<u64> {
    Path::new(file_name).file_stem()?.to_str()?.parse().ok()
}

pub fn format_index(index: u64, ext: &str) -> String {
    format!("{:06}.{}", index, ext)
}

/// Start index for a batch of `batch` new files given the numeric stems
/// already present. When the batch is smaller than the lowest existing
/// stem the low gap is reclaimed and numbering starts at 0; otherwise it
/// continues after the highest stem.
///
/// The outcome depends on the batch size relative to the gap, which is a
/// known quirk kept as-is.
pub fn start_index<I>(existing: I, batch: usize) -> u64
where
    I: IntoIterator<Item = u64>,
{
    let mut bounds: Option<(u64, u64)> = None;
    for n in existing {
        bounds = Some(match bounds {
            None => (n, n),
            Some((min, max)) => (min.min(n), max.max(n)),
        });
    }
    match bounds {
        None => 0,
        Some((min, _)) if (batch as u64) < min => 0,
        Some((_, max)) => max.saturating_add(1),
    }
}

/// Hands out collision-free indices for one destination folder. Stems
/// already taken (by any extension, sidecars included) are skipped.
#[derive(Debug)]
pub struct Allocator {
    next: u64,
    taken: HashSet<u64>,
}

impl Allocator {
    pub fn for_dir(dir: &Path, batch: usize) -> Result<Self> {
        let taken = existing_indices(dir)?;
        let next = start_index(taken.iter().copied(), batch);
        Ok(Self { next, taken })
    }

    pub fn peek(&self) -> u64 {
        self.next
    }

    /// Fails once the numeric space above the start is used up.
    pub fn next_index(&mut self) -> Result<u64> {
        let mut index = self.next;
        while self.taken.contains(&index) {
            index = index
                .checked_add(1)
                .ok_or_else(|| Error::Conflict("no free file index left".into()))?;
        }
        self.taken.insert(index);
        self.next = index.saturating_add(1);
        Ok(index)
    }
}

fn existing_indices(dir: &Path) -> Result<HashSet<u64>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(err) => return Err(err).at(dir),
    };
    let mut taken = HashSet::new();
    for entry in entries {
        let entry = entry.at(dir)?;
        if let Some(n) = entry.file_name().to_str().and_then(parse_index) {
            taken.insert(n);
        }
    }
    Ok(taken)
}

/// One exclusive section per destination folder, so two writers into the
/// same concept never race on index allocation.
#[derive(Debug, Default)]
pub struct FolderLocks {
    inner: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl FolderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, dir: &Path) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(dir.to_path_buf()).or_default().clone()
    }
}

pub(crate) fn hold(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reclaims_low_gap_for_small_batches() {
        assert_eq!(start_index([10, 20], 5), 0);
    }

    #[test]
    fn continues_after_max_for_large_batches() {
        assert_eq!(start_index([10, 20], 15), 21);
        assert_eq!(start_index([10, 20], 10), 21);
    }

    #[test]
    fn empty_folder_starts_at_zero() {
        assert_eq!(start_index(std::iter::empty(), 3), 0);
        assert_eq!(start_index([0, 1, 2], 3), 3);
    }

    #[test]
    fn parses_numeric_stems_only() {
        assert_eq!(parse_index("000012.jpeg"), Some(12));
        assert_eq!(parse_index("000012.txt"), Some(12));
        assert_eq!(parse_index("cover.png"), None);
        assert_eq!(format_index(7, "png"), "000007.png");
    }

    #[test]
    fn allocator_skips_taken_stems() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["000000.jpeg", "000002.png", "notes.md"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        // min is 0, so a batch of 3 continues after max
        let mut alloc = Allocator::for_dir(dir.path(), 3).unwrap();
        assert_eq!(alloc.peek(), 3);
        assert_eq!(alloc.next_index().unwrap(), 3);
        assert_eq!(alloc.next_index().unwrap(), 4);
    }

    #[test]
    fn allocator_on_missing_dir_starts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut alloc = Allocator::for_dir(&dir.path().join("nope"), 2).unwrap();
        assert_eq!(alloc.next_index().unwrap(), 0);
        assert_eq!(alloc.next_index().unwrap(), 1);
    }

    #[test]
    fn huge_stems_exhaust_instead_of_overflowing() {
        assert_eq!(start_index([0, u64::MAX], 1), u64::MAX);

        let dir = tempfile::tempdir().unwrap();
        for name in ["000000.png", "18446744073709551615.png"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let mut alloc = Allocator::for_dir(dir.path(), 1).unwrap();
        assert!(matches!(alloc.next_index(), Err(Error::Conflict(_))));
        assert!(matches!(alloc.next_index(), Err(Error::Conflict(_))));
    }

    #[test]
    fn same_folder_shares_one_lock() {
        let locks = FolderLocks::new();
        let a = locks.lock_for(Path::new("/repo/x"));
        let b = locks.lock_for(Path::new("/repo/x"));
        let c = locks.lock_for(Path::new("/repo/y"));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
