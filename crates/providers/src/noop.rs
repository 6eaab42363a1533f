use crate::{ProviderError, TagScores, Tagger};

#[derive(Debug, Default)]
pub struct NoopTagger;

#[async_trait::async_trait]
impl Tagger for NoopTagger {
    async fn interrogate(&self, _image: &image::DynamicImage) -> Result<TagScores, ProviderError> {
        Ok(TagScores::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_no_candidates() {
        let img = image::DynamicImage::new_rgb8(4, 4);
        let scores = NoopTagger.interrogate(&img).await.unwrap();
        assert!(scores.is_empty());
    }
}
