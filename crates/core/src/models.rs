use serde::Serialize;
use std::fmt::Display;
use storage::SubsetKind;
use tracing::warn;

/// A concept folder found under a subset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Concept {
    pub name: String,
    pub repeat: u32,
    /// Folder name, `<repeat>_<name>`.
    pub folder: String,
    /// Repository-relative path of the folder.
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageRecord {
    pub path: String,
    pub basename: String,
    pub stem: String,
    pub extension: String,
    pub size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub captions: Vec<String>,
    pub concept: Option<String>,
    pub repeat: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConceptDetail {
    pub imageset: String,
    pub kind: SubsetKind,
    pub name: String,
    pub repeat: u32,
    pub images: Vec<ImageRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubsetDetail {
    pub imageset: String,
    pub kind: SubsetKind,
    pub concepts: Vec<Concept>,
    pub images: Vec<ImageRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConceptOverview {
    pub name: String,
    pub repeat: u32,
    pub cover: Option<String>,
    pub image_count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SubsetOverview {
    pub total_repeat: u64,
    pub image_count: usize,
    pub concepts: Vec<ConceptOverview>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImagesetOverview {
    pub name: String,
    pub train: Option<SubsetOverview>,
    pub regular: Option<SubsetOverview>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovedImage {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub item: String,
    pub reason: String,
}

/// Outcome of a batch operation. A failing item is recorded and the loop
/// moves on; `processed` holds only the items that went through.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport<T> {
    pub processed: Vec<T>,
    pub failures: Vec<ItemFailure>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            processed: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> BatchReport<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.processed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn ok(&mut self, item: T) {
        self.processed.push(item);
    }

    pub(crate) fn fail(&mut self, item: impl Into<String>, reason: impl Display) {
        let item = item.into();
        let reason = reason.to_string();
        warn!(%item, %reason, "batch item skipped");
        self.failures.push(ItemFailure { item, reason });
    }
}
