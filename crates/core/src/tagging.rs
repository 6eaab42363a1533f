//! Automatic captioning: a [`Tagger`] scores candidate tokens, the scores
//! are thresholded here, and survivors are merged into the caption.

use crate::config::AppConfig;
use crate::decode::open_image;
use crate::models::BatchReport;
use crate::store::ConceptStore;
use crate::{Error, Result};
use providers::http::{HttpTagger, HttpTaggerConfig};
use providers::noop::NoopTagger;
use providers::{ProviderRegistry, TagScores, Tagger};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TagRequest {
    /// Tokens always added, ranked as if scored 1.0.
    pub additional_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    pub threshold: f32,
    /// Registry name of the tagger; the preferred one when absent.
    pub tagger: Option<String>,
}

impl Default for TagRequest {
    fn default() -> Self {
        Self {
            additional_tags: Vec::new(),
            exclude_tags: Vec::new(),
            threshold: 0.35,
            tagger: None,
        }
    }
}

impl TagRequest {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            threshold: cfg.tagging.threshold,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaggedImage {
    pub path: String,
    pub captions: Vec<String>,
}

/// Tokens kept from `scores`, highest score first. Ties fall back to name
/// order so the result does not depend on map iteration.
pub fn postprocess_tags(scores: &TagScores, request: &TagRequest) -> Vec<String> {
    let mut scored: Vec<(&str, f32)> = scores
        .iter()
        .filter(|&(_, &score)| score >= request.threshold)
        .map(|(tag, &score)| (tag.as_str(), score))
        .collect();
    scored.sort_by(|a, b| a.0.cmp(b.0));

    let mut ranked: Vec<(&str, f32)> = request
        .additional_tags
        .iter()
        .map(|tag| (tag.as_str(), 1.0))
        .chain(scored)
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut tags: Vec<String> = Vec::with_capacity(ranked.len());
    for (tag, _) in ranked {
        let tag = tag.trim();
        if tag.is_empty() || request.exclude_tags.iter().any(|x| x.trim() == tag) {
            continue;
        }
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

impl ConceptStore {
    /// Tags each image and merges the result into its caption. Returns the
    /// merged caption per image; failures are isolated.
    pub async fn interrogate_images(
        &self,
        tagger: &dyn Tagger,
        paths: &[String],
        request: &TagRequest,
    ) -> BatchReport<TaggedImage> {
        let mut report = BatchReport::new();
        for path in paths {
            match self.tag_one(tagger, path, request).await {
                Ok(captions) => report.ok(TaggedImage {
                    path: path.clone(),
                    captions,
                }),
                Err(err) => report.fail(path.as_str(), err),
            }
        }
        info!(tagged = report.count(), failed = report.failures.len(), "interrogation finished");
        report
    }

    /// Like [`interrogate_images`](Self::interrogate_images) for one image,
    /// except that an image already carrying captions is left untouched.
    pub async fn interrogate_image(
        &self,
        tagger: &dyn Tagger,
        path: &str,
        request: &TagRequest,
    ) -> Result<Vec<String>> {
        let existing = self.load_caption(path)?;
        if !existing.is_empty() {
            return Ok(existing);
        }
        self.tag_one(tagger, path, request).await
    }

    async fn tag_one(&self, tagger: &dyn Tagger, path: &str, request: &TagRequest) -> Result<Vec<String>> {
        let abs = self.existing_image(path)?;
        let img = open_image(&abs)?;
        let scores = tagger.interrogate(&img).await?;
        let tags = postprocess_tags(&scores, request);
        self.captions.merge(&abs, &tags)
    }
}

/// Taggers available under the given config. `noop` is always present;
/// `http` is added when `tagging.url` is set, authenticating with
/// `TAGGER_API_KEY` from the environment when that is set.
pub fn build_registry(cfg: &AppConfig) -> ProviderRegistry {
    let mut reg = ProviderRegistry::new().with_tagger("noop", Arc::new(NoopTagger));
    if let Some(url) = &cfg.tagging.url {
        let tagger = HttpTagger::new(HttpTaggerConfig {
            base_url: url.clone(),
            model: cfg.tagging.model.clone(),
            api_key: std::env::var_os("TAGGER_API_KEY").map(|k| k.to_string_lossy().into_owned()),
        });
        reg = reg.with_tagger("http", Arc::new(tagger));
    }
    reg.set_preferred_tagger(&cfg.tagging.provider)
}

/// Resolves the tagger a request asks for.
pub fn select_tagger(reg: &ProviderRegistry, request: &TagRequest) -> Result<Arc<dyn Tagger>> {
    reg.tagger(request.tagger.as_deref()).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(&str, f32)]) -> TagScores {
        pairs.iter().map(|(t, s)| (t.to_string(), *s)).collect()
    }

    #[test]
    fn thresholds_and_orders_by_score() {
        let req = TagRequest {
            threshold: 0.5,
            ..TagRequest::default()
        };
        let tags = postprocess_tags(&scores(&[("sky", 0.6), ("girl", 0.9), ("hat", 0.2)]), &req);
        assert_eq!(tags, vec!["girl", "sky"]);
    }

    #[test]
    fn additional_first_and_excluded_dropped() {
        let req = TagRequest {
            additional_tags: vec!["katana".into()],
            exclude_tags: vec!["sky".into()],
            threshold: 0.35,
            tagger: None,
        };
        let tags = postprocess_tags(
            &scores(&[("sky", 0.99), ("girl", 0.8), ("katana", 0.4), ("solo", 0.5)]),
            &req,
        );
        assert_eq!(tags, vec!["katana", "girl", "solo"]);
    }

    #[test]
    fn threshold_is_inclusive() {
        let req = TagRequest {
            threshold: 0.5,
            ..TagRequest::default()
        };
        assert_eq!(postprocess_tags(&scores(&[("a", 0.5)]), &req), vec!["a"]);
    }

    #[test]
    fn registry_prefers_configured_provider() {
        let mut cfg = AppConfig::default();
        let reg = build_registry(&cfg);
        assert_eq!(reg.names(), vec!["noop"]);
        assert!(select_tagger(&reg, &TagRequest::default()).is_ok());

        cfg.tagging.url = Some("http://localhost:9".into());
        cfg.tagging.provider = "http".into();
        let reg = build_registry(&cfg);
        assert_eq!(reg.names(), vec!["http", "noop"]);
        assert_eq!(reg.preferred_tagger.as_deref(), Some("http"));
    }
}
