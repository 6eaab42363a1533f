mod common;

use common::{gradient, store, write_png};
use curator_core::Error;
use image::ImageFormat;
use std::fs;
use std::thread;

#[test]
fn regenerated_thumbnail_is_byte_identical() {
    let (_tmp, _cfg, store) = store();
    let rel = "imageset-demo/src/1_big/000000.png";
    write_png(&store.layout().root().join(rel), 600, 1200);

    let path = store.thumbnail(rel).unwrap();
    assert_eq!(path, store.layout().thumbnail_root().join(rel));
    let first = fs::read(&path).unwrap();
    assert_eq!(image::image_dimensions(&path).unwrap(), (256, 512));

    assert!(store.thumbnails().invalidate(rel).unwrap());
    assert!(!path.exists());
    let second = store.thumbnails().read(rel).unwrap();
    assert_eq!(first, second);

    assert!(!store.thumbnails().invalidate("imageset-demo/src/1_big/000404.png").unwrap());
}

#[test]
fn missing_source_and_artifact_is_not_found() {
    let (_tmp, _cfg, store) = store();
    assert!(matches!(
        store.thumbnail("imageset-demo/src/1_x/000000.png"),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn small_images_are_not_upscaled() {
    let (_tmp, _cfg, store) = store();
    let rel = "imageset-demo/reg/1_small/000000.png";
    write_png(&store.layout().root().join(rel), 40, 30);
    let path = store.thumbnail(rel).unwrap();
    assert_eq!(image::image_dimensions(&path).unwrap(), (40, 30));
}

#[test]
fn concurrent_gets_all_return_the_artifact() {
    let (_tmp, _cfg, store) = store();
    let rel = "imageset-demo/src/1_big/000000.png";
    write_png(&store.layout().root().join(rel), 700, 700);
    let expected = store.layout().thumbnail_root().join(rel);

    for _ in 0..4 {
        store.thumbnails().invalidate(rel).unwrap();
        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| store.thumbnail(rel))).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for result in results {
            assert_eq!(result.unwrap(), expected);
        }
    }

    let leftovers: Vec<_> = fs::read_dir(expected.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, vec!["000000.png"]);
}

#[test]
fn other_formats_get_png_bytes_under_the_source_name() {
    let (_tmp, _cfg, store) = store();
    let rel = "imageset-demo/src/1_big/000000.tiff";
    let source = store.layout().root().join(rel);
    fs::create_dir_all(source.parent().unwrap()).unwrap();
    gradient(300, 900).save(&source).unwrap();

    let path = store.thumbnail(rel).unwrap();
    assert_eq!(path, store.layout().thumbnail_root().join(rel));
    let bytes = fs::read(&path).unwrap();
    assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
    let (_, height) = curator_core::decode::image_dimensions(&path).unwrap();
    assert_eq!(height, 512);
}
