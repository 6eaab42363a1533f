mod common;

use common::{source_dir, store};
use std::fs::{self, File};
use storage::SubsetKind;

fn archives(root: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(root)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".zip"))
        .collect();
    names.sort();
    names
}

#[test]
fn export_twice_leaves_one_archive_and_no_staging() {
    let (tmp, _cfg, store) = store();
    store.create_imageset("demo").unwrap();
    store.create_imageset("other").unwrap();
    let src = source_dir(tmp.path(), 2);
    store.add_concept("demo", SubsetKind::Train, "katana", 8, &src).unwrap();
    store.add_concept("demo", SubsetKind::Regular, "sword", 1, &src).unwrap();
    store
        .save_caption(
            "imageset-demo/src/8_katana/000000.jpeg",
            &["1girl".to_string(), "katana".to_string()],
        )
        .unwrap();
    let root = store.layout().root().to_path_buf();
    fs::write(root.join("stale.zip"), b"old").unwrap();

    for _ in 0..2 {
        let archive = store.export_archive("demo").unwrap();
        assert_eq!(archive, root.join("demo.zip"));
        assert_eq!(archives(&root), vec!["demo.zip"]);
        assert!(!store.layout().staging_dir().exists());
    }

    store.export_archive("other").unwrap();
    assert_eq!(archives(&root), vec!["other.zip"]);

    let archive = store.export_archive("demo").unwrap();
    let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
    let names: Vec<String> = zip.file_names().map(str::to_string).collect();
    for expected in [
        "src/8_katana/000000.jpeg",
        "src/8_katana/000000.txt",
        "src/8_katana/000001.txt",
        "reg/1_sword/000001.jpeg",
    ] {
        assert!(names.iter().any(|n| n == expected), "missing {expected} in {names:?}");
    }
    let mut caption = String::new();
    std::io::Read::read_to_string(&mut zip.by_name("src/8_katana/000000.txt").unwrap(), &mut caption)
        .unwrap();
    assert_eq!(caption, "1girl, katana");
}

#[test]
fn export_of_missing_imageset_fails_cleanly() {
    let (_tmp, _cfg, store) = store();
    assert!(matches!(
        store.export_archive("ghost"),
        Err(curator_core::Error::NotFound(_))
    ));
    assert!(!store.layout().staging_dir().exists());
}
