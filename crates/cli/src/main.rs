use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::commands::{
    open_store, overview_lines, parse_tags, print_json, print_lines, read_caption_map,
    report_lines, tag_images,
};
use curator_core::config;
use curator_core::hashing::HashIndex;
use curator_core::tagging::TagRequest;
use std::path::PathBuf;
use storage::{ConceptFolder, SubsetKind};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;
    let store = open_store(&cfg)?;

    match cli.command {
        Commands::Imagesets { json } => {
            let names = store.list_imagesets()?;
            if json {
                print_json(&names)?;
            } else {
                print_lines(&names);
            }
        }
        Commands::Create { name } => {
            store.create_imageset(&name)?;
            println!("created imageset {}", name);
        }
        Commands::RenameImageset { from, to } => {
            store.rename_imageset(&from, &to)?;
            println!("renamed imageset {} -> {}", from, to);
        }
        Commands::DeleteImageset { name } => {
            store.delete_imageset(&name)?;
            println!("deleted imageset {}", name);
        }
        Commands::DeleteSubset { imageset, subset } => {
            store.delete_subset(&imageset, subset)?;
            println!("deleted {} subset of {}", subset, imageset);
        }
        Commands::Overview { imageset, json } => {
            let overview = store.overview(&imageset)?;
            if json {
                print_json(&overview)?;
            } else {
                print_lines(overview_lines(&overview));
            }
        }
        Commands::Concepts { imageset, subset, json } => {
            let concepts = store.list_concepts(&imageset, subset)?;
            if json {
                print_json(&concepts)?;
            } else {
                print_lines(concepts.iter().map(|c| c.path.as_str()));
            }
        }
        Commands::Concept {
            imageset,
            subset,
            name,
            repeat,
        } => print_json(&store.load_concept(&imageset, subset, &name, repeat)?)?,
        Commands::Subset { imageset, subset } => {
            print_json(&store.load_subset(&imageset, subset)?)?
        }
        Commands::AddConcept {
            imageset,
            subset,
            name,
            repeat,
            source,
        } => {
            let count = store.add_concept(&imageset, subset, &name, repeat, &source)?;
            println!("imported {} image(s) into {}_{}", count, repeat, name.trim());
        }
        Commands::Import {
            imageset,
            subset,
            folder,
            files,
            json,
        } => {
            let report = store.import_files(&imageset, subset, &folder, &files)?;
            if json {
                print_json(&report)?;
            } else {
                print_lines(report_lines(&report, |p| p.clone()));
            }
        }
        Commands::RenameConcept {
            imageset,
            subset,
            name,
            repeat,
            new_name,
            new_repeat,
        } => {
            let from = ConceptFolder::new(repeat, name);
            let to = ConceptFolder::new(
                new_repeat.unwrap_or(repeat),
                new_name.unwrap_or_else(|| from.name.clone()),
            );
            let renamed = store.rename_concept(&imageset, subset, &from, &to)?;
            println!("renamed concept to {}_{}", renamed.repeat, renamed.name);
        }
        Commands::DeleteConcept {
            imageset,
            subset,
            folder,
        } => {
            store.delete_concept(&imageset, subset, &folder)?;
            println!("deleted concept {}", folder);
        }
        Commands::Renumber {
            imageset,
            subset,
            folder,
            json,
        } => {
            let report = store.renumber_concept(&imageset, subset, &folder)?;
            if json {
                print_json(&report)?;
            } else {
                print_lines(report_lines(&report, |p| p.clone()));
            }
        }
        Commands::Images { concept, json } => {
            let images = store.list_images(&concept)?;
            if json {
                print_json(&images)?;
            } else {
                print_lines(&images);
            }
        }
        Commands::Move {
            imageset,
            subset,
            name,
            repeat,
            paths,
            json,
        } => {
            let report = store.move_images(&paths, &imageset, subset, &name, repeat)?;
            if json {
                print_json(&report)?;
            } else {
                print_lines(report_lines(&report, |m| format!("{} -> {}", m.from, m.to)));
            }
        }
        Commands::Delete { paths, json } => {
            let report = store.delete_images(&paths);
            if json {
                print_json(&report)?;
            } else {
                print_lines(report_lines(&report, |p| p.clone()));
            }
        }
        Commands::Caption { path, set, merge } => {
            let tokens = match (set, merge) {
                (Some(raw), _) => {
                    let tokens = parse_tags(&raw);
                    store.save_caption(&path, &tokens)?;
                    tokens
                }
                (None, Some(raw)) => store.merge_caption(&path, &parse_tags(&raw))?,
                (None, None) => store.load_caption(&path)?,
            };
            println!("{}", tokens.join(", "));
        }
        Commands::SaveCaptions { file, json } => {
            let captions = read_caption_map(&file)?;
            let report = store.save_captions(&captions);
            if json {
                print_json(&report)?;
            } else {
                print_lines(report_lines(&report, |p| p.clone()));
            }
        }
        Commands::Thumbnail { path } => {
            println!("{}", store.thumbnail(&path)?.display());
        }
        Commands::Export { imageset } => {
            let archive = store.export_archive(&imageset)?;
            println!("{}", archive.display());
        }
        Commands::Similar {
            paths,
            threshold,
            json,
        } => {
            let index = HashIndex::new(&cfg.hashing)?;
            let threshold = threshold.unwrap_or(cfg.hashing.threshold);
            let report = store.find_similar(&index, &paths, threshold)?;
            if json {
                print_json(&report)?;
            } else {
                for (i, cluster) in report.clusters.iter().enumerate() {
                    println!("cluster {}:", i + 1);
                    print_lines(cluster.iter().map(|r| format!("  {}", r.path)));
                }
                for failure in &report.failures {
                    println!("failed {}: {}", failure.item, failure.reason);
                }
            }
        }
        Commands::Tag {
            paths,
            additional,
            exclude,
            threshold,
            tagger,
            keep_existing,
            json,
        } => {
            let mut request = TagRequest::from_config(&cfg);
            request.additional_tags = additional.as_deref().map(parse_tags).unwrap_or_default();
            request.exclude_tags = exclude.as_deref().map(parse_tags).unwrap_or_default();
            request.tagger = tagger;
            if let Some(threshold) = threshold {
                request.threshold = threshold;
            }
            let report = tag_images(&cfg, &store, &paths, &request, keep_existing).await?;
            if json {
                print_json(&report)?;
            } else {
                print_lines(report_lines(&report, |t| {
                    format!("{}: {}", t.path, t.captions.join(", "))
                }));
            }
        }
        Commands::Watch => {
            info!("starting thumbnail watch");
            tokio::task::spawn_blocking(move || cli::watch::watch_repo(&cfg)).await??;
        }
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "imageset-curator", version, about = "Curate image datasets for training")]
struct Cli {
    /// Path to config file (without extension), e.g. config/default
    #[arg(long)]
    config: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List imagesets
    Imagesets {
        #[arg(long)]
        json: bool,
    },
    /// Create an empty imageset
    Create { name: String },
    /// Rename an imageset
    RenameImageset { from: String, to: String },
    /// Delete an imageset with its thumbnails
    DeleteImageset { name: String },
    /// Delete the train or regular subset of an imageset
    DeleteSubset { imageset: String, subset: SubsetKind },
    /// Per-subset totals and concept covers
    Overview {
        imageset: String,
        #[arg(long)]
        json: bool,
    },
    /// List concept folders of a subset
    Concepts {
        imageset: String,
        subset: SubsetKind,
        #[arg(long)]
        json: bool,
    },
    /// Full image records of one concept (JSON)
    Concept {
        imageset: String,
        subset: SubsetKind,
        name: String,
        repeat: u32,
    },
    /// Full image records of a whole subset (JSON)
    Subset { imageset: String, subset: SubsetKind },
    /// Create a concept and import every image from a directory
    AddConcept {
        imageset: String,
        subset: SubsetKind,
        name: String,
        repeat: u32,
        /// Directory to import from
        source: PathBuf,
    },
    /// Import specific files into a concept folder
    Import {
        imageset: String,
        subset: SubsetKind,
        /// Concept folder name, `<repeat>_<name>`
        folder: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Rename a concept and/or change its repeat weight
    RenameConcept {
        imageset: String,
        subset: SubsetKind,
        name: String,
        repeat: u32,
        #[arg(long)]
        new_name: Option<String>,
        #[arg(long)]
        new_repeat: Option<u32>,
    },
    /// Delete a concept folder with its thumbnails
    DeleteConcept {
        imageset: String,
        subset: SubsetKind,
        folder: String,
    },
    /// Re-encode and renumber every image of a concept
    Renumber {
        imageset: String,
        subset: SubsetKind,
        folder: String,
        #[arg(long)]
        json: bool,
    },
    /// List images of a concept by relative path
    Images {
        /// Concept path, e.g. imageset-demo/src/8_katana
        concept: String,
        #[arg(long)]
        json: bool,
    },
    /// Move images into a concept, renumbering them
    Move {
        imageset: String,
        subset: SubsetKind,
        name: String,
        repeat: u32,
        #[arg(required = true)]
        paths: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Delete images with their thumbnails and captions
    Delete {
        #[arg(required = true)]
        paths: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show, replace (--set) or extend (--merge) an image caption
    Caption {
        path: String,
        /// Comma-separated tokens replacing the caption
        #[arg(long, conflicts_with = "merge")]
        set: Option<String>,
        /// Comma-separated tokens added to the caption
        #[arg(long)]
        merge: Option<String>,
    },
    /// Save captions from a JSON map of path -> tokens
    SaveCaptions {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print the thumbnail path, generating it when missing
    Thumbnail { path: String },
    /// Package an imageset into <root>/<imageset>.zip
    Export { imageset: String },
    /// Group near-duplicate images
    Similar {
        #[arg(required = true)]
        paths: Vec<String>,
        /// Cluster threshold; defaults to hashing.threshold
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        json: bool,
    },
    /// Tag images and merge the tags into their captions
    Tag {
        #[arg(required = true)]
        paths: Vec<String>,
        /// Comma-separated tokens always added
        #[arg(long)]
        additional: Option<String>,
        /// Comma-separated tokens never added
        #[arg(long)]
        exclude: Option<String>,
        #[arg(long)]
        threshold: Option<f32>,
        /// Tagger name; defaults to tagging.provider
        #[arg(long)]
        tagger: Option<String>,
        /// Leave images that already have captions untouched
        #[arg(long)]
        keep_existing: bool,
        #[arg(long)]
        json: bool,
    },
    /// Drop thumbnails of images changed outside the tool
    Watch,
}
