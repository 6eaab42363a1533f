//! Perceptual fingerprints: phash, ahash, dhash and whash over the luma
//! channel, each a square bit matrix of side `hash_size`.

use crate::config::HashConfig;
use crate::decode::open_image;
use crate::models::BatchReport;
use crate::{Error, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use serde::Serialize;
use std::f64::consts::PI;
use std::path::Path;
use tracing::debug;

/// A square bit matrix stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    side: usize,
    bits: Vec<bool>,
}

impl Signature {
    pub fn new(side: usize, bits: Vec<bool>) -> Result<Self> {
        if bits.len() != side * side {
            return Err(Error::InvalidInput(format!(
                "signature of side {} needs {} bits, got {}",
                side,
                side * side,
                bits.len()
            )));
        }
        Ok(Self { side, bits })
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    /// Differing bits. Bits present in only one of two unequal signatures
    /// count as differing.
    pub fn hamming(&self, other: &Signature) -> usize {
        let common = self
            .bits
            .iter()
            .zip(&other.bits)
            .filter(|(a, b)| a != b)
            .count();
        common + self.bits.len().abs_diff(other.bits.len())
    }

    /// `1 - hamming / side²`, where side is the row length of the matrix.
    pub fn similarity(&self, other: &Signature) -> f64 {
        let side = self.side.max(1) as f64;
        1.0 - self.hamming(other) as f64 / (side * side)
    }

    pub fn to_hex(&self) -> String {
        self.bits
            .chunks(8)
            .map(|chunk| {
                let byte = chunk
                    .iter()
                    .fold(0u8, |acc, &bit| (acc << 1) | u8::from(bit));
                format!("{:02x}", byte << (8 - chunk.len()))
            })
            .collect()
    }
}

impl Serialize for Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageHashes {
    pub phash: Signature,
    pub ahash: Signature,
    pub dhash: Signature,
    pub whash: Signature,
}

impl ImageHashes {
    /// Per-algorithm similarity in phash, ahash, dhash, whash order.
    pub fn similarities(&self, other: &ImageHashes) -> [f64; 4] {
        [
            self.phash.similarity(&other.phash),
            self.ahash.similarity(&other.ahash),
            self.dhash.similarity(&other.dhash),
            self.whash.similarity(&other.whash),
        ]
    }

    /// Best of the four similarities.
    pub fn fuse_score(&self, other: &ImageHashes) -> f64 {
        self.similarities(other)
            .into_iter()
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

#[derive(Debug, Clone)]
pub struct HashIndex {
    hash_size: u32,
    highfreq_factor: u32,
    image_scale: u32,
}

impl HashIndex {
    pub fn new(cfg: &HashConfig) -> Result<Self> {
        if cfg.hash_size < 2 {
            return Err(Error::InvalidInput(format!(
                "hash_size must be at least 2, got {}",
                cfg.hash_size
            )));
        }
        if cfg.highfreq_factor == 0 {
            return Err(Error::InvalidInput("highfreq_factor must be positive".into()));
        }
        Ok(Self {
            hash_size: cfg.hash_size,
            highfreq_factor: cfg.highfreq_factor,
            image_scale: cfg.image_scale,
        })
    }

    pub fn hash_size(&self) -> u32 {
        self.hash_size
    }

    pub fn compute(&self, path: &Path) -> Result<ImageHashes> {
        let img = open_image(path)?;
        let hashes = self.compute_image(&img);
        debug!(path = %path.display(), phash = %hashes.phash.to_hex(), "hashed");
        Ok(hashes)
    }

    pub fn compute_image(&self, img: &DynamicImage) -> ImageHashes {
        let luma = img.to_luma8();
        ImageHashes {
            phash: self.phash(&luma),
            ahash: self.ahash(&luma),
            dhash: self.dhash(&luma),
            whash: self.whash(&luma),
        }
    }

    /// Hashes every `(key, path)` pair. Unreadable images are reported and
    /// left out.
    pub fn compute_many<K, P>(&self, items: impl IntoIterator<Item = (K, P)>) -> BatchReport<(K, ImageHashes)>
    where
        K: ToString,
        P: AsRef<Path>,
    {
        let mut report = BatchReport::new();
        for (key, path) in items {
            match self.compute(path.as_ref()) {
                Ok(hashes) => report.ok((key, hashes)),
                Err(err) => report.fail(key.to_string(), err),
            }
        }
        report
    }

    fn side(&self) -> usize {
        self.hash_size as usize
    }

    fn ahash(&self, luma: &GrayImage) -> Signature {
        let n = self.hash_size;
        let small = imageops::resize(luma, n, n, FilterType::Lanczos3);
        let pixels: Vec<f64> = small.pixels().map(|p| p.0[0] as f64).collect();
        let mean = pixels.iter().sum::<f64>() / pixels.len() as f64;
        signature(self.side(), pixels.iter().map(|&v| v > mean).collect())
    }

    fn dhash(&self, luma: &GrayImage) -> Signature {
        let n = self.hash_size;
        let small = imageops::resize(luma, n + 1, n, FilterType::Lanczos3);
        let mut bits = Vec::with_capacity(self.side() * self.side());
        for y in 0..n {
            for x in 0..n {
                let left = small.get_pixel(x, y).0[0];
                let right = small.get_pixel(x + 1, y).0[0];
                bits.push(right > left);
            }
        }
        signature(self.side(), bits)
    }

    /// Low-frequency block of a 2-D DCT-II, compared against its median.
    fn phash(&self, luma: &GrayImage) -> Signature {
        let n = self.side();
        let size = n * self.highfreq_factor as usize;
        let small = imageops::resize(luma, size as u32, size as u32, FilterType::Lanczos3);
        let pixels: Vec<f64> = small.pixels().map(|p| p.0[0] as f64).collect();

        let table: Vec<f64> = (0..n)
            .flat_map(|k| {
                (0..size).map(move |i| (PI * k as f64 * (2 * i + 1) as f64 / (2 * size) as f64).cos())
            })
            .collect();
        let cos = |k: usize, i: usize| table[k * size + i];

        // Rows first, keeping only the first n coefficients of each.
        let mut rows = vec![0.0f64; size * n];
        for y in 0..size {
            for k in 0..n {
                rows[y * n + k] = (0..size).map(|x| pixels[y * size + x] * cos(k, x)).sum::<f64>();
            }
        }
        let mut low = vec![0.0f64; n * n];
        for ky in 0..n {
            for kx in 0..n {
                low[ky * n + kx] = (0..size).map(|y| rows[y * n + kx] * cos(ky, y)).sum::<f64>();
            }
        }
        let med = median(&low);
        signature(n, low.iter().map(|&v| v > med).collect())
    }

    /// Haar approximation band: the image is scaled to a power of two and
    /// halved by 2x2 averaging down to the hash size.
    fn whash(&self, luma: &GrayImage) -> Signature {
        let n = self.side();
        let scale = (self.image_scale.max(1).next_power_of_two() as usize).max(n.next_power_of_two());
        let small = imageops::resize(luma, scale as u32, scale as u32, FilterType::Lanczos3);
        let mut band: Vec<f64> = small.pixels().map(|p| p.0[0] as f64 / 255.0).collect();
        let mut size = scale;
        while size / 2 >= n && size > n {
            let half = size / 2;
            let mut next = vec![0.0f64; half * half];
            for y in 0..half {
                for x in 0..half {
                    let at = |dy: usize, dx: usize| band[(2 * y + dy) * size + 2 * x + dx];
                    next[y * half + x] = (at(0, 0) + at(0, 1) + at(1, 0) + at(1, 1)) / 4.0;
                }
            }
            band = next;
            size = half;
        }
        if size != n {
            band = resample(&band, size, n);
        }
        let med = median(&band);
        signature(n, band.iter().map(|&v| v > med).collect())
    }
}

fn signature(side: usize, bits: Vec<bool>) -> Signature {
    Signature { side, bits }
}

/// Nearest-neighbour resample of a square grid. Only reached when the
/// hash size is not a power of two.
fn resample(grid: &[f64], from: usize, to: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(to * to);
    for y in 0..to {
        for x in 0..to {
            let sy = y * from / to;
            let sx = x * from / to;
            out.push(grid[sy * from + sx]);
        }
    }
    out
}

/// Median with the two middle values averaged for even lengths.
fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn index(hash_size: u32) -> HashIndex {
        HashIndex::new(&HashConfig {
            hash_size,
            ..HashConfig::default()
        })
        .unwrap()
    }

    fn gradient(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            Rgb([(x * 255 / w) as u8, (y * 255 / h) as u8, ((x + y) % 256) as u8])
        }))
    }

    #[test]
    fn similarity_divides_by_side_squared() {
        let a = Signature::new(4, vec![false; 16]).unwrap();
        let mut bits = vec![false; 16];
        bits[0] = true;
        bits[5] = true;
        let b = Signature::new(4, bits).unwrap();
        assert_eq!(a.hamming(&b), 2);
        assert!((a.similarity(&b) - (1.0 - 2.0 / 16.0)).abs() < 1e-12);
        assert_eq!(a.similarity(&a), 1.0);
    }

    #[test]
    fn rejects_wrong_bit_count() {
        assert!(Signature::new(3, vec![true; 8]).is_err());
    }

    #[test]
    fn hex_is_row_major_msb_first() {
        let mut bits = vec![false; 16];
        bits[0] = true;
        bits[15] = true;
        assert_eq!(Signature::new(4, bits).unwrap().to_hex(), "8001");
    }

    #[test]
    fn hashes_are_deterministic_and_sized() {
        let idx = index(8);
        let img = gradient(120, 80);
        let a = idx.compute_image(&img);
        let b = idx.compute_image(&img);
        assert_eq!(a, b);
        for sig in [&a.phash, &a.ahash, &a.dhash, &a.whash] {
            assert_eq!(sig.side(), 8);
            assert_eq!(sig.bits().len(), 64);
        }
        assert_eq!(a.fuse_score(&b), 1.0);
    }

    #[test]
    fn resized_copy_scores_higher_than_unrelated_image() {
        let idx = index(8);
        let original = gradient(200, 200);
        let resized = original.resize_exact(100, 100, FilterType::Triangle);
        let flipped = original.fliph().flipv();
        let near = idx.compute_image(&original).fuse_score(&idx.compute_image(&resized));
        let far = idx.compute_image(&original).fuse_score(&idx.compute_image(&flipped));
        assert!(near > far, "near {near} far {far}");
        assert!(near > 0.8);
    }

    #[test]
    fn median_matches_even_and_odd_lengths() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn config_validation() {
        assert!(HashIndex::new(&HashConfig {
            hash_size: 1,
            ..HashConfig::default()
        })
        .is_err());
        assert!(HashIndex::new(&HashConfig {
            highfreq_factor: 0,
            ..HashConfig::default()
        })
        .is_err());
    }
}
