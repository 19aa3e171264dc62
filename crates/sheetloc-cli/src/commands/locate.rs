//! Locate command - find the page number on one image or PDF.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use sheetloc_core::{image_key, Localizer};

use super::{build_recognizer, format_reports, load_config, OutputFormat, PageReport, PageSource};

/// Arguments for the locate command.
#[derive(Args)]
pub struct LocateArgs {
    /// Input file (PDF or image)
    #[arg(required = true)]
    input: PathBuf,

    /// Only this 1-indexed PDF page
    #[arg(short, long)]
    page: Option<u32>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Write intermediate rasters to this directory
    #[arg(long)]
    debug_dir: Option<PathBuf>,
}

pub async fn run(args: LocateArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    if args.debug_dir.is_some() {
        config.pipeline.debug_dir = args.debug_dir.clone();
    }

    info!("Processing file: {}", args.input.display());
    let source = PageSource::open(&args.input, &config)?;
    let pages = match args.page {
        Some(page) if source.is_pdf() => vec![Some(page)],
        Some(_) => anyhow::bail!("--page only applies to PDF input"),
        None => source.pages(),
    };

    let localizer = Localizer::new(build_recognizer(&config)?, config);

    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("##-"),
    );

    let mut reports = Vec::with_capacity(pages.len());
    for page in pages {
        pb.set_message(match page {
            Some(n) => format!("page {}", n),
            None => "image".to_string(),
        });
        let image = source.load(page)?;
        let key = image_key(&image);
        let outcome = localizer.locate(&image)?;
        reports.push(PageReport::new(&args.input, page, &key, &outcome));
        pb.inc(1);
    }
    pb.finish_and_clear();

    let output = format_reports(&reports, args.format)?;
    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        eprintln!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    debug!("Total processing time: {:?}", start.elapsed());
    Ok(())
}
