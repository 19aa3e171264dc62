//! Refine command - re-examine the area around a prior box, or around every
//! unrefined box in an annotation store.

use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use tracing::warn;

use sheetloc_core::locate::Refinement;
use sheetloc_core::models::config::SheetlocConfig;
use sheetloc_core::store::{pending_refinement, refine_stored, JsonAnnotationStore, StoreAction};
use sheetloc_core::{Localizer, Rect};

use super::{build_recognizer, load_config};

/// Arguments for the refine command.
#[derive(Args)]
pub struct RefineArgs {
    /// Page image
    #[arg(required_unless_present = "store", conflicts_with = "store")]
    image: Option<PathBuf>,

    /// Prior box as x1,y1,x2,y2
    #[arg(long, value_parser = parse_rect, required_unless_present = "store")]
    bbox: Option<Rect>,

    /// Refine every unreviewed, unrefined annotation in this store instead
    #[arg(long)]
    store: Option<PathBuf>,

    /// Padding around the prior box (overrides selection.refine_margin)
    #[arg(long)]
    margin: Option<i32>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

fn parse_rect(s: &str) -> Result<Rect, String> {
    s.parse::<Rect>().map_err(|e| e.to_string())
}

pub async fn run(args: RefineArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(margin) = args.margin {
        config.selection.refine_margin = margin;
    }

    if let Some(store) = &args.store {
        return refine_store(store, config);
    }

    let (Some(image_path), Some(bbox)) = (&args.image, args.bbox) else {
        anyhow::bail!("refine needs an image and --bbox, or --store");
    };
    let image = image::open(image_path)?;
    let localizer = Localizer::new(build_recognizer(&config)?, config);

    match localizer.refine(&image, &bbox)? {
        Refinement::Refined(result) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!(
                    "{} {} at {} (confidence {:.1})",
                    style("✓").green(),
                    result.text,
                    result.bbox,
                    result.confidence
                );
            }
        }
        Refinement::NeedsManual { hint } => {
            if args.json {
                println!("{}", serde_json::json!({ "needs_manual": true, "hint": hint }));
            } else {
                println!(
                    "{} Needs manual correction, nothing found in {}",
                    style("!").yellow(),
                    hint
                );
            }
        }
    }
    Ok(())
}

fn refine_store(dir: &Path, config: SheetlocConfig) -> anyhow::Result<()> {
    let store = JsonAnnotationStore::open(dir)?;
    let pending = pending_refinement(&store)?;
    println!("{} {} annotations to refine", style("ℹ").blue(), pending.len());

    let localizer = Localizer::new(build_recognizer(&config)?, config);
    let (mut refined, mut dropped, mut skipped) = (0usize, 0usize, 0usize);

    for annotation in &pending {
        let Some(image_path) = &annotation.image_path else {
            skipped += 1;
            continue;
        };
        let image = match image::open(image_path) {
            Ok(image) => image,
            Err(e) => {
                warn!("Cannot open {}: {}", image_path.display(), e);
                skipped += 1;
                continue;
            }
        };

        match refine_stored(&localizer, &store, annotation, &image)? {
            StoreAction::Saved(_) => refined += 1,
            StoreAction::Removed => dropped += 1,
            StoreAction::Unchanged => skipped += 1,
        }
    }

    println!();
    println!(
        "{} {} refined, {} dropped for manual annotation, {} skipped",
        style("✓").green(),
        refined,
        dropped,
        skipped
    );
    Ok(())
}
