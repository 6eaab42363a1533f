//! Per-image caption tokens, kept in two places: a JSON array in the
//! image's embedded comment field, and a `<stem>.txt` sidecar beside the
//! image (comma-space joined). The sidecar write is the reliable one; the
//! embedded copy is best effort.

use crate::error::IoContext;
use crate::Result;
use bytes::Bytes;
use img_parts::jpeg::{Jpeg, JpegSegment};
use img_parts::png::{Png, PngChunk};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub const SIDECAR_EXT: &str = "txt";

const JPEG_COM: u8 = 0xFE;
const JPEG_MAX_SEGMENT: usize = 65_533;
const PNG_TEXT: [u8; 4] = *b"tEXt";
const PNG_IEND: [u8; 4] = *b"IEND";
const PNG_COMMENT_KEY: &[u8] = b"Comment";

#[derive(Debug, Error)]
enum EmbeddedError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("container does not carry an embedded comment")]
    Unsupported,
    #[error("malformed metadata: {0}")]
    Malformed(String),
}

/// Result of reading the embedded caption. `Unavailable` keeps the cause so
/// callers can log it; it never turns into an error for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptionRead {
    Tokens(Vec<String>),
    Unavailable { cause: String },
}

impl CaptionRead {
    pub fn into_tokens(self) -> Vec<String> {
        match self {
            CaptionRead::Tokens(tokens) => tokens,
            CaptionRead::Unavailable { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CaptionStore;

impl CaptionStore {
    pub fn new() -> Self {
        Self
    }

    pub fn read(&self, image: &Path) -> CaptionRead {
        match read_embedded(image) {
            Ok(tokens) => CaptionRead::Tokens(tokens),
            Err(err) => {
                debug!(path = %image.display(), error = %err, "embedded caption unavailable");
                CaptionRead::Unavailable {
                    cause: err.to_string(),
                }
            }
        }
    }

    /// Embedded tokens, or an empty list when they cannot be read.
    pub fn load(&self, image: &Path) -> Vec<String> {
        self.read(image).into_tokens()
    }

    pub fn save(&self, image: &Path, tokens: &[String]) -> Result<()> {
        if let Err(err) = write_embedded(image, tokens) {
            warn!(path = %image.display(), error = %err, "embedded caption not written");
        }
        self.write_sidecar(image, tokens)
    }

    /// Set union of the stored tokens and `new_tokens`; existing order first.
    pub fn merge(&self, image: &Path, new_tokens: &[String]) -> Result<Vec<String>> {
        let merged = union_tokens(&self.load(image), new_tokens);
        self.save(image, &merged)?;
        Ok(merged)
    }

    pub fn sidecar_path(image: &Path) -> PathBuf {
        image.with_extension(SIDECAR_EXT)
    }

    pub fn write_sidecar(&self, image: &Path, tokens: &[String]) -> Result<()> {
        let sidecar = Self::sidecar_path(image);
        fs::write(&sidecar, tokens.join(", ")).at(&sidecar)
    }

    pub fn read_sidecar(&self, image: &Path) -> Option<Vec<String>> {
        let raw = fs::read_to_string(Self::sidecar_path(image)).ok()?;
        Some(
            raw.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }
}

pub fn union_tokens(existing: &[String], new_tokens: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(existing.len() + new_tokens.len());
    for token in existing.iter().chain(new_tokens) {
        if !merged.contains(token) {
            merged.push(token.clone());
        }
    }
    merged
}

enum Container {
    Jpeg,
    Png,
    Other,
}

fn sniff(bytes: &[u8]) -> Container {
    if bytes.starts_with(&[0xFF, 0xD8]) {
        Container::Jpeg
    } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Container::Png
    } else {
        Container::Other
    }
}

fn malformed(err: impl ToString) -> EmbeddedError {
    EmbeddedError::Malformed(err.to_string())
}

fn parse_tokens(raw: &[u8]) -> Vec<String> {
    serde_json::from_slice::<Vec<String>>(raw).unwrap_or_default()
}

fn png_comment(chunk: &PngChunk) -> Option<&[u8]> {
    if chunk.kind() != PNG_TEXT {
        return None;
    }
    let contents = chunk.contents();
    let split = contents.iter().position(|b| *b == 0)?;
    if &contents[..split] == PNG_COMMENT_KEY {
        Some(&contents[split + 1..])
    } else {
        None
    }
}

fn read_embedded(path: &Path) -> std::result::Result<Vec<String>, EmbeddedError> {
    let bytes = fs::read(path)?;
    match sniff(&bytes) {
        Container::Jpeg => {
            let jpeg = Jpeg::from_bytes(Bytes::from(bytes)).map_err(malformed)?;
            Ok(jpeg
                .segments()
                .iter()
                .find(|s| s.marker() == JPEG_COM)
                .map(|s| parse_tokens(s.contents()))
                .unwrap_or_default())
        }
        Container::Png => {
            let png = Png::from_bytes(Bytes::from(bytes)).map_err(malformed)?;
            Ok(png
                .chunks()
                .iter()
                .find_map(png_comment)
                .map(parse_tokens)
                .unwrap_or_default())
        }
        Container::Other => Err(EmbeddedError::Unsupported),
    }
}

fn write_embedded(path: &Path, tokens: &[String]) -> std::result::Result<(), EmbeddedError> {
    let payload = serde_json::to_vec(tokens).map_err(malformed)?;
    let bytes = fs::read(path)?;
    let mut out = Vec::with_capacity(bytes.len() + payload.len() + 16);
    match sniff(&bytes) {
        Container::Jpeg => {
            if payload.len() > JPEG_MAX_SEGMENT {
                return Err(malformed("caption exceeds one comment segment"));
            }
            let mut jpeg = Jpeg::from_bytes(Bytes::from(bytes)).map_err(malformed)?;
            let segments = jpeg.segments_mut();
            segments.retain(|s| s.marker() != JPEG_COM);
            // COM goes after the APPn block so EXIF/JFIF stay where readers expect them.
            let at = segments
                .iter()
                .take_while(|s| (0xE0..=0xEF).contains(&s.marker()))
                .count();
            segments.insert(
                at,
                JpegSegment::new_with_contents(JPEG_COM, Bytes::from(payload)),
            );
            jpeg.encoder().write_to(&mut out)?;
        }
        Container::Png => {
            let mut png = Png::from_bytes(Bytes::from(bytes)).map_err(malformed)?;
            let chunks = png.chunks_mut();
            chunks.retain(|c| png_comment(c).is_none());
            let at = chunks
                .iter()
                .position(|c| c.kind() == PNG_IEND)
                .unwrap_or(chunks.len());
            let mut contents = PNG_COMMENT_KEY.to_vec();
            contents.push(0);
            contents.extend_from_slice(&payload);
            chunks.insert(at, PngChunk::new(PNG_TEXT, Bytes::from(contents)));
            png.encoder().write_to(&mut out)?;
        }
        Container::Other => return Err(EmbeddedError::Unsupported),
    }

    let tmp = path.with_extension("caption-tmp");
    fs::write(&tmp, &out)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn write_image(path: &Path, format: image::ImageFormat) {
        let img = image::RgbImage::from_fn(16, 16, |x, y| image::Rgb([(x * 16) as u8, (y * 16) as u8, 90]));
        img.save_with_format(path, format).unwrap();
    }

    #[test]
    fn union_collapses_duplicates() {
        let merged = union_tokens(&tokens(&["a", "b", "a"]), &tokens(&["c", "b"]));
        assert_eq!(merged, tokens(&["a", "b", "c"]));
    }

    #[test]
    fn jpeg_round_trips_embedded_caption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000001.jpeg");
        write_image(&path, image::ImageFormat::Jpeg);
        let store = CaptionStore::new();

        store.save(&path, &tokens(&["1girl", "katana"])).unwrap();
        assert_eq!(store.read(&path), CaptionRead::Tokens(tokens(&["1girl", "katana"])));
        assert_eq!(
            fs::read_to_string(dir.path().join("000001.txt")).unwrap(),
            "1girl, katana"
        );
        // still decodes as an image after the rewrite
        assert!(image::open(&path).is_ok());
    }

    #[test]
    fn png_round_trips_embedded_caption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000002.png");
        write_image(&path, image::ImageFormat::Png);
        let store = CaptionStore::new();

        store.save(&path, &tokens(&["sky"])).unwrap();
        store.save(&path, &tokens(&["sky", "cloud"])).unwrap();
        assert_eq!(store.load(&path), tokens(&["sky", "cloud"]));
        assert!(image::open(&path).is_ok());
    }

    #[test]
    fn merge_is_additive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000003.jpeg");
        write_image(&path, image::ImageFormat::Jpeg);
        let store = CaptionStore::new();

        store.merge(&path, &tokens(&["a", "b"])).unwrap();
        let merged = store.merge(&path, &tokens(&["c", "b"])).unwrap();
        let mut sorted = merged.clone();
        sorted.sort();
        assert_eq!(sorted, tokens(&["a", "b", "c"]));
        assert_eq!(store.load(&path), merged);
    }

    #[test]
    fn corrupt_metadata_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpeg");
        // APP1 claims a 64 KiB body that is not there
        fs::write(&path, [0xFF, 0xD8, 0xFF, 0xE1, 0xFF, 0xFF, 0x00]).unwrap();
        let store = CaptionStore::new();

        assert!(matches!(store.read(&path), CaptionRead::Unavailable { .. }));
        assert!(store.load(&path).is_empty());
        assert!(store.load(&dir.path().join("missing.jpeg")).is_empty());
    }

    #[test]
    fn non_json_comment_is_empty() {
        assert!(parse_tokens(b"hello world").is_empty());
        assert_eq!(parse_tokens(br#"["x","y"]"#), tokens(&["x", "y"]));
    }

    #[test]
    fn unsupported_container_still_writes_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000004.bmp");
        write_image(&path, image::ImageFormat::Bmp);
        let store = CaptionStore::new();

        store.save(&path, &tokens(&["x", "y"])).unwrap();
        assert!(store.load(&path).is_empty());
        assert_eq!(store.read_sidecar(&path), Some(tokens(&["x", "y"])));
    }
}
