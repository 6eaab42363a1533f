use crate::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub repo: RepoConfig,
    pub image: ImageConfig,
    pub thumbnail: ThumbnailConfig,
    pub hashing: HashConfig,
    pub tagging: TaggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    pub root: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            root: "./repo".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            OutputFormat::Jpeg => image::ImageFormat::Jpeg,
            OutputFormat::Png => image::ImageFormat::Png,
        }
    }

    /// Lossy targets carry no alpha channel, so decoded images are flattened
    /// to RGB before encoding.
    pub fn is_lossy(self) -> bool {
        matches!(self, OutputFormat::Jpeg)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_width: 256,
            max_height: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HashConfig {
    pub hash_size: u32,
    pub highfreq_factor: u32,
    pub image_scale: u32,
    pub threshold: f64,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            hash_size: 32,
            highfreq_factor: 4,
            image_scale: 64,
            threshold: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    pub provider: String,
    pub url: Option<String>,
    pub model: String,
    pub threshold: f32,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            provider: "noop".to_string(),
            url: None,
            model: "wd14-vit-v2".to_string(),
            threshold: 0.35,
        }
    }
}

/// Loads the config from `path` (or `config/default` when present), then
/// applies `CURATOR_*` environment overrides, e.g. `CURATOR_REPO__ROOT`.
pub fn load(path: Option<&str>) -> Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(
        config::Environment::with_prefix("CURATOR")
            .prefix_separator("_")
            .separator("__"),
    );
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}
