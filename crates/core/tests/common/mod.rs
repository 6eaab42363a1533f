#![allow(dead_code)]

use curator_core::config::AppConfig;
use curator_core::ConceptStore;
use image::{Rgb, RgbImage};
use std::path::Path;
use tempfile::TempDir;

pub fn store() -> (TempDir, AppConfig, ConceptStore) {
    let temp = tempfile::tempdir().unwrap();
    let mut cfg = AppConfig::default();
    cfg.repo.root = temp.path().join("repo").to_string_lossy().into_owned();
    let store = ConceptStore::new(&cfg).unwrap();
    (temp, cfg, store)
}

pub fn gradient(w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| Rgb([(x * 255 / w) as u8, (y * 255 / h) as u8, 128]))
}

pub fn checker(w: u32, h: u32, cell: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| {
        if (x / cell + y / cell) % 2 == 0 {
            Rgb([250, 250, 250])
        } else {
            Rgb([5, 5, 5])
        }
    })
}

pub fn write_png(path: &Path, w: u32, h: u32) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    gradient(w, h).save(path).unwrap();
}

/// A directory of `count` importable images plus one junk file.
pub fn source_dir(root: &Path, count: usize) -> std::path::PathBuf {
    let dir = root.join("incoming");
    for i in 0..count {
        write_png(&dir.join(format!("pic{i}.png")), 40 + i as u32, 30);
    }
    std::fs::write(dir.join("notes.txt"), "not an image").unwrap();
    dir
}
