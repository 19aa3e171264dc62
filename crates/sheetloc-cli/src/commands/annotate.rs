//! Annotate command - store page-number annotations, asking an operator on a miss.

use std::path::PathBuf;

use clap::Args;
use console::style;
use glob::glob;
use tracing::{debug, info};

use sheetloc_core::locate::{Localization, ManualOutcome};
use sheetloc_core::models::annotation::{AnnotationSource, NewAnnotation};
use sheetloc_core::store::{record_localization, AnnotationStore, JsonAnnotationStore, StoreAction};
use sheetloc_core::{image_key, Localizer};

use super::{build_recognizer, cache_page, is_supported_input, load_config, PageSource};
use crate::reviewer::TerminalReviewer;

/// Arguments for the annotate command.
#[derive(Args)]
pub struct AnnotateArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Annotation store directory
    #[arg(long, required = true)]
    store: PathBuf,

    /// Re-annotate pages that already have an unconfirmed annotation
    #[arg(long)]
    force: bool,

    /// Never ask for a manual box; misses are only reported
    #[arg(long)]
    no_prompt: bool,
}

#[derive(Default)]
struct Tally {
    automatic: usize,
    manual: usize,
    skipped: usize,
    missed: usize,
}

pub async fn run(args: AnnotateArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = JsonAnnotationStore::open(&args.store)?;
    let mut reviewer = TerminalReviewer::new(config.pipeline.working_directory.join("review"));

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| is_supported_input(p))
        .collect();
    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    let localizer = Localizer::new(build_recognizer(&config)?, config.clone());
    let mut tally = Tally::default();

    for path in &files {
        let source = PageSource::open(path, &config)?;
        for page in source.pages() {
            let image = source.load(page)?;
            let key = image_key(&image);
            let label = match page {
                Some(n) => format!("{}#{}", path.display(), n),
                None => path.display().to_string(),
            };

            if let Some(existing) = store.find_existing(&key)? {
                if existing.is_protected() || !args.force {
                    debug!("{} already annotated as {:?}", label, existing.page_number);
                    tally.skipped += 1;
                    continue;
                }
            }

            let image_path = if source.is_pdf() {
                cache_page(&config, &key, &image)?
            } else {
                path.clone()
            };

            let outcome = localizer.locate(&image)?;
            if let Localization::Found(result) = &outcome {
                record_localization(&store, &key, &outcome, Some(&image_path))?;
                println!("{} {}: {} at {}", style("✓").green(), label, result.text, result.bbox);
                tally.automatic += 1;
                continue;
            }

            println!("{} {}: page number not found", style("!").yellow(), label);
            let manual = if args.no_prompt {
                ManualOutcome::Cancelled
            } else {
                localizer.resolve_manually(&image, outcome.hint(), &mut reviewer)?
            };

            match manual {
                ManualOutcome::Located(result) => {
                    let record = NewAnnotation::new(&key, &result.text, result.bbox, AnnotationSource::Manual)
                        .with_image_path(&image_path);
                    store.save(record)?;
                    println!("{} {}: {} at {} (manual)", style("✓").green(), label, result.text, result.bbox);
                    tally.manual += 1;
                }
                ManualOutcome::Cancelled => {
                    if record_localization(&store, &key, &outcome, None)? == StoreAction::Removed {
                        info!("Removed stale annotation for {}", label);
                    }
                    tally.missed += 1;
                }
            }
        }
    }

    println!();
    println!(
        "{} {} automatic, {} manual, {} skipped, {} missed",
        style("✓").green(),
        tally.automatic,
        tally.manual,
        tally.skipped,
        tally.missed
    );
    Ok(())
}
