//! Batch command - locate page numbers across many files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use sheetloc_core::models::config::SheetlocConfig;
use sheetloc_core::ocr::TextRecognizer;
use sheetloc_core::store::{needs_annotation, record_localization, AnnotationStore, JsonAnnotationStore, StoreAction};
use sheetloc_core::{image_key, Localizer};

use super::{
    build_recognizer, cache_page, format_reports, is_supported_input, load_config, write_csv_reports,
    OutputFormat, PageReport, PageSource,
};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Output directory for per-file results
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of parallel workers (default: available CPU cores)
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Record results in this annotation store directory
    #[arg(long)]
    store: Option<PathBuf>,

    /// Re-locate pages that already have an annotation
    #[arg(long)]
    force: bool,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,
}

/// What happened to one page.
enum PageOutcome {
    Done {
        report: PageReport,
        action: Option<StoreAction>,
    },
    Skipped,
    Failed {
        page: Option<u32>,
        error: String,
    },
}

/// Result of processing a single file.
struct FileResult {
    path: PathBuf,
    outcome: Result<Vec<PageOutcome>, String>,
    processing_time_ms: u64,
}

#[derive(Default)]
struct Counts {
    found: usize,
    not_found: usize,
    skipped: usize,
    failed: usize,
    saved: usize,
    removed: usize,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = Arc::new(load_config(config_path)?);

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| is_supported_input(p))
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let store: Option<Arc<dyn AnnotationStore>> = match &args.store {
        Some(dir) => Some(Arc::new(JsonAnnotationStore::open(dir)?)),
        None => None,
    };

    let jobs = args
        .jobs
        .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4))
        .max(1);
    println!(
        "{} Found {} files to process with {} workers",
        style("ℹ").blue(),
        files.len(),
        jobs
    );

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let semaphore = Arc::new(Semaphore::new(jobs));
    let mut handles = Vec::with_capacity(files.len());

    for path in files {
        let semaphore = semaphore.clone();
        let config = config.clone();
        let store = store.clone();
        let pb = pb.clone();
        let force = args.force;

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await?;
            let file_start = Instant::now();

            let task_path = path.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                process_file(&task_path, &config, store.as_deref(), force)
            })
            .await?
            .map_err(|e| format!("{:#}", e));

            pb.inc(1);
            anyhow::Ok(FileResult {
                path,
                outcome,
                processing_time_ms: file_start.elapsed().as_millis() as u64,
            })
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        let result = handle.await??;
        let failure = match &result.outcome {
            Err(e) => Some(e.clone()),
            Ok(pages) => pages.iter().find_map(|p| match p {
                PageOutcome::Failed { error, .. } => Some(error.clone()),
                _ => None,
            }),
        };
        if let Some(error_msg) = failure {
            if args.continue_on_error {
                warn!("Failed to process {}: {}", result.path.display(), error_msg);
            } else {
                pb.abandon();
                error!("Failed to process {}: {}", result.path.display(), error_msg);
                anyhow::bail!("Processing failed for {}: {}", result.path.display(), error_msg);
            }
        }
        debug!("{} took {}ms", result.path.display(), result.processing_time_ms);
        results.push(result);
    }
    pb.finish_with_message("Complete");

    let mut counts = Counts::default();
    let mut summary_rows = Vec::new();
    let mut failures = Vec::new();

    for result in &results {
        let pages = match &result.outcome {
            Ok(pages) => pages,
            Err(e) => {
                counts.failed += 1;
                failures.push((result.path.display().to_string(), e.clone()));
                summary_rows.push(failed_report(&result.path, None, e));
                continue;
            }
        };

        let mut file_reports = Vec::new();
        for page in pages {
            match page {
                PageOutcome::Done { report, action } => {
                    if report.found {
                        counts.found += 1;
                    } else {
                        counts.not_found += 1;
                    }
                    match action {
                        Some(StoreAction::Saved(_)) => counts.saved += 1,
                        Some(StoreAction::Removed) => counts.removed += 1,
                        _ => {}
                    }
                    file_reports.push(report.clone());
                }
                PageOutcome::Skipped => counts.skipped += 1,
                PageOutcome::Failed { page, error } => {
                    counts.failed += 1;
                    let report = failed_report(&result.path, *page, error);
                    failures.push((report.label(), error.clone()));
                    summary_rows.push(report);
                }
            }
        }

        if let Some(output_dir) = &args.output_dir {
            if !file_reports.is_empty() {
                let output_name = result
                    .path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("sheet");
                let output_path = output_dir.join(format!("{}.{}", output_name, args.format.extension()));
                fs::write(&output_path, format_reports(&file_reports, args.format)?)?;
                debug!("Wrote output to {}", output_path.display());
            }
        }
        summary_rows.extend(file_reports);
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        let mut wtr = csv::Writer::from_path(&summary_path)?;
        write_csv_reports(&mut wtr, &summary_rows)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} found, {} not found, {} failed",
        style(counts.found).green(),
        style(counts.not_found).yellow(),
        style(counts.failed).red()
    );
    if store.is_some() {
        println!(
            "   {} skipped (already annotated), {} saved, {} removed",
            counts.skipped, counts.saved, counts.removed
        );
    }

    if !failures.is_empty() {
        println!();
        println!("{}", style("Failed:").red());
        for (label, error) in &failures {
            println!("  - {}: {}", label, error);
        }
    }

    Ok(())
}

fn failed_report(path: &Path, page: Option<u32>, error: &str) -> PageReport {
    PageReport {
        file: path.display().to_string(),
        page,
        image_key: String::new(),
        found: false,
        page_number: None,
        bbox: None,
        confidence: None,
        conventional: None,
        sidepanel: None,
        reason: Some(format!("failed: {}", error)),
    }
}

fn process_file(
    path: &Path,
    config: &SheetlocConfig,
    store: Option<&dyn AnnotationStore>,
    force: bool,
) -> anyhow::Result<Vec<PageOutcome>> {
    let source = PageSource::open(path, config)?;
    let localizer = Localizer::new(build_recognizer(config)?, config.clone());

    let mut outcomes = Vec::new();
    for page in source.pages() {
        match process_page(&source, page, path, &localizer, store, force) {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                warn!("{} page {:?} failed: {:#}", path.display(), page, e);
                outcomes.push(PageOutcome::Failed {
                    page,
                    error: format!("{:#}", e),
                });
            }
        }
    }
    Ok(outcomes)
}

fn process_page<R: TextRecognizer>(
    source: &PageSource,
    page: Option<u32>,
    path: &Path,
    localizer: &Localizer<R>,
    store: Option<&dyn AnnotationStore>,
    force: bool,
) -> anyhow::Result<PageOutcome> {
    let image = source.load(page)?;
    let key = image_key(&image);

    let image_path = if source.is_pdf() {
        cache_page(localizer.config(), &key, &image)?
    } else {
        path.to_path_buf()
    };

    if let Some(store) = store {
        if !needs_annotation(store, &key, force)? {
            debug!("{} already annotated, skipping", key);
            return Ok(PageOutcome::Skipped);
        }
    }

    let outcome = localizer.locate(&image)?;
    let action = match store {
        Some(store) => Some(record_localization(store, &key, &outcome, Some(&image_path))?),
        None => None,
    };

    Ok(PageOutcome::Done {
        report: PageReport::new(path, page, &key, &outcome),
        action,
    })
}
