//! Provider abstractions for image tagging models.
//!
//! A tagger looks at a decoded image and returns candidate caption tokens
//! with a confidence score each. Thresholding and caption merging happen in
//! the caller.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod http;
pub mod noop;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("invalid image: {0}")]
    InvalidImage(String),
}

/// Candidate token -> confidence in `[0, 1]`.
pub type TagScores = HashMap<String, f32>;

#[async_trait::async_trait]
pub trait Tagger: Send + Sync {
    async fn interrogate(&self, image: &image::DynamicImage) -> Result<TagScores, ProviderError>;
}

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    taggers: HashMap<String, Arc<dyn Tagger>>,
    pub preferred_tagger: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tagger(mut self, name: &str, provider: Arc<dyn Tagger>) -> Self {
        self.taggers.insert(name.to_string(), provider);
        self
    }

    pub fn set_preferred_tagger(mut self, name: &str) -> Self {
        self.preferred_tagger = Some(name.to_string());
        self
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.taggers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn tagger(&self, name: Option<&str>) -> Result<Arc<dyn Tagger>, ProviderError> {
        let key = name
            .map(str::to_string)
            .or_else(|| self.preferred_tagger.clone())
            .ok_or_else(|| ProviderError::UnknownProvider("no tagger configured".into()))?;
        self.taggers
            .get(&key)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(key))
    }
}
