//! CLI for locating sheet numbers on construction drawings.

mod commands;
mod reviewer;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{annotate, batch, config, locate, refine, review};

/// Sheetloc - find the page number in the title block of drawing sheets
#[derive(Parser)]
#[command(name = "sheetloc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Locate the page number on an image or every page of a PDF
    Locate(locate::LocateArgs),

    /// Re-examine the region around a prior, approximate box
    Refine(refine::RefineArgs),

    /// Locate page numbers in many files in parallel
    Batch(batch::BatchArgs),

    /// Annotate pages, asking an operator when localization fails
    Annotate(annotate::AnnotateArgs),

    /// Mark stored annotations as valid or invalid
    Review(review::ReviewArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Locate(args) => locate::run(args, config_path).await,
        Commands::Refine(args) => refine::run(args, config_path).await,
        Commands::Batch(args) => batch::run(args, config_path).await,
        Commands::Annotate(args) => annotate::run(args, config_path).await,
        Commands::Review(args) => review::run(args, config_path).await,
        Commands::Config(args) => config::run(args, config_path).await,
    }
}
