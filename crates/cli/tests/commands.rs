use cli::commands::{open_store, overview_lines, read_caption_map, tag_images};
use cli::watch::{invalidate_for_events, stale_thumbnails};
use curator_core::config::AppConfig;
use curator_core::tagging::TagRequest;
use storage::{RepoLayout, SubsetKind};

fn setup() -> (tempfile::TempDir, AppConfig) {
    let temp = tempfile::tempdir().unwrap();
    let mut cfg = AppConfig::default();
    cfg.repo.root = temp.path().join("repo").to_string_lossy().into_owned();
    (temp, cfg)
}

fn seed(cfg: &AppConfig, temp: &std::path::Path) -> curator_core::ConceptStore {
    let store = open_store(cfg).unwrap();
    store.create_imageset("demo").unwrap();
    let src = temp.join("incoming");
    std::fs::create_dir_all(&src).unwrap();
    for i in 0..2u32 {
        image::RgbImage::from_pixel(20 + i, 20, image::Rgb([10, 200, 30]))
            .save(src.join(format!("{i}.png")))
            .unwrap();
    }
    store.add_concept("demo", SubsetKind::Train, "leaf", 6, &src).unwrap();
    store
}

#[test]
fn watch_events_map_to_imageset_files_only() {
    let layout = RepoLayout::new("/data/repo");
    let paths = vec![
        "/data/repo/imageset-demo/src/6_leaf/000000.jpeg".into(),
        "/data/repo/imageset-demo/src/6_leaf/000000.jpeg".into(),
        "/data/repo/.thumbnail/imageset-demo/src/6_leaf/000000.jpeg".into(),
        "/data/repo/demo.zip".into(),
        "/elsewhere/x.png".into(),
    ];
    assert_eq!(
        stale_thumbnails(&layout, &paths),
        vec!["imageset-demo/src/6_leaf/000000.jpeg"]
    );
}

#[test]
fn watch_invalidation_drops_cached_thumbnails() {
    let (temp, cfg) = setup();
    let store = seed(&cfg, temp.path());
    let rel = "imageset-demo/src/6_leaf/000001.jpeg";
    let thumb = store.thumbnail(rel).unwrap();

    let changed = vec![store.layout().root().join(rel)];
    let dropped = invalidate_for_events(store.thumbnails(), store.layout(), &changed);
    assert_eq!(dropped, 1);
    assert!(!thumb.exists());
}

#[test]
fn overview_lines_list_concepts() {
    let (temp, cfg) = setup();
    let store = seed(&cfg, temp.path());
    let lines = overview_lines(&store.overview("demo").unwrap());
    assert_eq!(lines[0], "imageset demo");
    assert_eq!(lines[1], "  train: 2 images, 12 steps");
    assert!(lines[2].starts_with("    6_leaf: 2 images"));
}

#[test]
fn caption_map_file_is_parsed() {
    let temp = tempfile::tempdir().unwrap();
    let file = temp.path().join("captions.json");
    std::fs::write(&file, r#"{"imageset-demo/src/6_leaf/000000.jpeg": ["leaf", "green"]}"#).unwrap();
    let map = read_caption_map(&file).unwrap();
    assert_eq!(map["imageset-demo/src/6_leaf/000000.jpeg"], vec!["leaf", "green"]);
    assert!(read_caption_map(&temp.path().join("missing.json")).is_err());
}

#[tokio::test]
async fn noop_tagging_only_adds_requested_tokens() {
    let (temp, cfg) = setup();
    let store = seed(&cfg, temp.path());
    let rel = "imageset-demo/src/6_leaf/000000.jpeg".to_string();
    store.save_caption(&rel, &["leaf".to_string()]).unwrap();

    let request = TagRequest {
        additional_tags: vec!["plant".into()],
        ..TagRequest::default()
    };
    let report = tag_images(&cfg, &store, &[rel.clone()], &request, false)
        .await
        .unwrap();
    assert_eq!(report.processed[0].captions, vec!["leaf", "plant"]);

    let kept = tag_images(&cfg, &store, &[rel.clone()], &request, true)
        .await
        .unwrap();
    assert_eq!(kept.processed[0].captions, vec!["leaf", "plant"]);

    let unknown = TagRequest {
        tagger: Some("missing".into()),
        ..TagRequest::default()
    };
    assert!(tag_images(&cfg, &store, &[rel], &unknown, false).await.is_err());
}
