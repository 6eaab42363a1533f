//! Keeps the thumbnail cache honest when images change outside the tool:
//! any filesystem event on a file under an imageset drops its thumbnail.

use anyhow::{Context, Result};
use curator_core::config::AppConfig;
use curator_core::thumbnail::ThumbnailCache;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Duration;
use storage::layout::IMAGESET_PREFIX;
use storage::RepoLayout;
use tracing::{debug, info, warn};

/// Repository-relative paths whose thumbnails an event on `paths` makes
/// stale. Paths outside imageset folders (the cache itself, staging,
/// archives) are ignored.
pub fn stale_thumbnails(layout: &RepoLayout, paths: &[PathBuf]) -> Vec<String> {
    let mut out = Vec::new();
    for path in paths {
        let Some(rel) = layout.relativize(path) else {
            continue;
        };
        if !rel.starts_with(IMAGESET_PREFIX) || !rel.contains('/') {
            continue;
        }
        if !out.contains(&rel) {
            out.push(rel);
        }
    }
    out
}

pub fn invalidate_for_events(cache: &ThumbnailCache, layout: &RepoLayout, paths: &[PathBuf]) -> usize {
    let mut dropped = 0;
    for rel in stale_thumbnails(layout, paths) {
        if cache.invalidate_quiet(&rel) {
            debug!(%rel, "thumbnail dropped after external change");
            dropped += 1;
        }
    }
    dropped
}

/// Blocks watching the repository root until the channel closes.
pub fn watch_repo(cfg: &AppConfig) -> Result<()> {
    let root = canonical_root(Path::new(&cfg.repo.root))?;
    let layout = RepoLayout::new(root.clone());
    let cache = ThumbnailCache::new(layout.clone(), &cfg.thumbnail);

    let (tx, rx) = channel();
    let mut watcher: RecommendedWatcher = Watcher::new(
        tx,
        notify::Config::default().with_poll_interval(Duration::from_secs(2)),
    )?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!(root = %root.display(), "watching repository");

    for event in rx {
        match event {
            Ok(ev) => {
                invalidate_for_events(&cache, &layout, &ev.paths);
            }
            Err(e) => warn!(error = %e, "watch error"),
        }
    }
    Ok(())
}

fn canonical_root(root: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(root).with_context(|| format!("creating {}", root.display()))?;
    root.canonicalize()
        .with_context(|| format!("resolving {}", root.display()))
}
