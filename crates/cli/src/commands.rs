//! Helpers behind the subcommands: store construction, argument parsing,
//! output, and the async tagging path.

use anyhow::{Context, Result};
use curator_core::config::AppConfig;
use curator_core::models::{BatchReport, ImagesetOverview, SubsetOverview};
use curator_core::tagging::{build_registry, select_tagger, TagRequest, TaggedImage};
use curator_core::ConceptStore;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

pub fn open_store(cfg: &AppConfig) -> Result<ConceptStore> {
    ConceptStore::new(cfg).with_context(|| format!("opening repository at {}", cfg.repo.root))
}

/// Splits a comma-separated token list, trimming blanks.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads a `{ "<path>": ["token", ...] }` JSON file for bulk caption saves.
pub fn read_caption_map(path: &Path) -> Result<BTreeMap<String, Vec<String>>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let map = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(map)
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_lines<I, S>(lines: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for line in lines {
        println!("{}", line.as_ref());
    }
}

/// Plain-text rendering of a batch: processed items, then failures.
pub fn report_lines<T>(report: &BatchReport<T>, item: impl Fn(&T) -> String) -> Vec<String> {
    let mut lines: Vec<String> = report.processed.iter().map(item).collect();
    for failure in &report.failures {
        lines.push(format!("failed {}: {}", failure.item, failure.reason));
    }
    lines.push(format!(
        "{} processed, {} failed",
        report.count(),
        report.failures.len()
    ));
    lines
}

pub fn overview_lines(overview: &ImagesetOverview) -> Vec<String> {
    let mut lines = vec![format!("imageset {}", overview.name)];
    let subsets: [(&str, &Option<SubsetOverview>); 2] =
        [("train", &overview.train), ("regular", &overview.regular)];
    for (label, subset) in subsets {
        let Some(subset) = subset else {
            continue;
        };
        lines.push(format!(
            "  {}: {} images, {} steps",
            label, subset.image_count, subset.total_repeat
        ));
        for c in &subset.concepts {
            lines.push(format!(
                "    {}_{}: {} images, cover {}",
                c.repeat,
                c.name,
                c.image_count,
                c.cover.as_deref().unwrap_or("-")
            ));
        }
    }
    lines
}

/// Runs the configured (or requested) tagger over `paths`. With
/// `keep_existing`, images that already carry captions are returned as-is.
pub async fn tag_images(
    cfg: &AppConfig,
    store: &ConceptStore,
    paths: &[String],
    request: &TagRequest,
    keep_existing: bool,
) -> Result<BatchReport<TaggedImage>> {
    let registry = build_registry(cfg);
    let tagger = select_tagger(&registry, request)?;
    if !keep_existing {
        return Ok(store.interrogate_images(tagger.as_ref(), paths, request).await);
    }
    let mut report = BatchReport::new();
    for path in paths {
        match store.interrogate_image(tagger.as_ref(), path, request).await {
            Ok(captions) => report.processed.push(TaggedImage {
                path: path.clone(),
                captions,
            }),
            Err(err) => report.failures.push(curator_core::models::ItemFailure {
                item: path.clone(),
                reason: err.to_string(),
            }),
        }
    }
    Ok(report)
}
