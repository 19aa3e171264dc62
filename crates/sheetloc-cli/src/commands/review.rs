//! Review command - ask an operator whether stored annotations are right.

use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::warn;

use sheetloc_core::models::annotation::{Annotation, NewAnnotation};
use sheetloc_core::review::{ManualReviewer, ReviewVerdict};
use sheetloc_core::store::{AnnotationStore, JsonAnnotationStore};

use super::load_config;
use crate::reviewer::TerminalReviewer;

/// Arguments for the review command.
#[derive(Args)]
pub struct ReviewArgs {
    /// Annotation store directory
    #[arg(long, required = true)]
    store: PathBuf,

    /// Also review annotations that already have a verdict
    #[arg(long)]
    force: bool,
}

pub async fn run(args: ReviewArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = JsonAnnotationStore::open(&args.store)?;
    let mut reviewer = TerminalReviewer::new(config.pipeline.working_directory.join("review"));

    let pending: Vec<Annotation> = store
        .list()?
        .into_iter()
        .filter(|a| args.force || a.valid.is_none())
        .collect();
    println!("{} {} annotations to review", style("ℹ").blue(), pending.len());

    let (mut valid, mut invalid, mut skipped) = (0usize, 0usize, 0usize);
    for annotation in pending {
        let Some(image_path) = annotation.image_path.clone() else {
            warn!("{} has no page image, skipping", annotation.image_key);
            skipped += 1;
            continue;
        };
        let image = match image::open(&image_path) {
            Ok(image) => image,
            Err(e) => {
                warn!("Cannot open {}: {}", image_path.display(), e);
                skipped += 1;
                continue;
            }
        };

        let verdict =
            reviewer.request_validity_judgment(&image, &annotation.bbox, &annotation.page_number)?;
        match verdict {
            ReviewVerdict::Valid => valid += 1,
            ReviewVerdict::Invalid => invalid += 1,
            ReviewVerdict::Skip => {
                skipped += 1;
                continue;
            }
        }

        store.save(
            NewAnnotation::new(
                &annotation.image_key,
                &annotation.page_number,
                annotation.bbox,
                annotation.source,
            )
            .with_validity(verdict.validity())
            .with_refined(annotation.refined)
            .with_image_path(image_path),
        )?;
    }

    println!();
    println!(
        "{} {} valid, {} invalid, {} skipped",
        style("✓").green(),
        valid,
        invalid,
        skipped
    );
    Ok(())
}
