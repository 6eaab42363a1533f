//! Remote tagger reached over HTTP. The image is posted as PNG bytes and
//! the endpoint answers with `{"tags": {"<token>": <score>, ...}}`.

use crate::{ProviderError, TagScores, Tagger};
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct HttpTaggerConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

#[derive(Clone)]
pub struct HttpTagger {
    client: Client,
    cfg: Arc<HttpTaggerConfig>,
}

impl HttpTagger {
    pub fn new(cfg: HttpTaggerConfig) -> Self {
        Self {
            client: Client::new(),
            cfg: Arc::new(cfg),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/interrogate", self.cfg.base_url.trim_end_matches('/'))
    }
}

#[derive(Deserialize)]
struct InterrogateResponse {
    #[serde(default)]
    tags: TagScores,
}

pub fn encode_png(image: &image::DynamicImage) -> Result<Vec<u8>, ProviderError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), image::ImageOutputFormat::Png)
        .map_err(|e| ProviderError::InvalidImage(e.to_string()))?;
    Ok(buf)
}

#[async_trait::async_trait]
impl Tagger for HttpTagger {
    async fn interrogate(&self, image: &image::DynamicImage) -> Result<TagScores, ProviderError> {
        let body = encode_png(image)?;
        debug!(bytes = body.len(), model = %self.cfg.model, "posting image to tagger");

        let mut builder = self
            .client
            .post(self.endpoint())
            .query(&[("model", self.cfg.model.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(body);
        if let Some(key) = &self.cfg.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.bytes().await.unwrap_or(Bytes::from_static(b""));
            return Err(ProviderError::RequestFailed(format!(
                "{}: {}",
                status,
                String::from_utf8_lossy(&body)
            )));
        }

        let parsed: InterrogateResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        Ok(parsed.tags)
    }
}
