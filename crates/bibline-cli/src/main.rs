//! bibline - Scopus bibliometric pipeline
//!
//! Extracts a Scopus result set, cleans it into a deduplicated table and
//! derives yearly publication trends, leaving a manifest for every phase.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use bibline_core::{PipelineError, ProgressContext};
use bibline_store::Layout;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Settings;

#[derive(Parser)]
#[command(name = "bibline")]
#[command(about = "Scopus bibliometric pipeline: extract, clean, analyze")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Settings file path (default: ./bibline.toml or ~/.config/bibline/config.toml)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Project root for data/, outputs/ and logs/
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a Scopus search and store the raw result table
    Extract(cmd::extract::ExtractArgs),
    /// Deduplicate and normalize a raw table
    Clean(cmd::clean::CleanArgs),
    /// Yearly series, YoY growth, CAGR and optional figures
    Analyze(cmd::analyze::AnalyzeArgs),
    /// Show effective settings
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = ProgressContext::new();

    // Logging:
    //   TTY:     quiet (warn) unless --debug; spinners show activity
    //   non-TTY: info unless --debug; logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    bibline_core::init_logging(quiet, cli.debug, multi);

    match run(cli, &progress) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            let code = e
                .downcast_ref::<PipelineError>()
                .map_or(1, PipelineError::exit_code);
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli, progress: &ProgressContext) -> Result<()> {
    let settings = Settings::load(cli.settings.as_deref())?;
    let layout = Layout::new(settings.base_dir(cli.base_dir.as_deref()));

    match cli.command {
        Command::Extract(args) => cmd::extract::run(args, &settings, &layout, progress),
        Command::Clean(args) => cmd::clean::run(args, &settings, &layout, progress),
        Command::Analyze(args) => cmd::analyze::run(args, &layout, progress),
        Command::Config => {
            let requests = settings.scopus.requests();
            cmd::print_summary(
                "Setting",
                &[
                    ("Base directory", layout.base().display().to_string()),
                    ("Prefer Parquet", settings.output.prefer_parquet.to_string()),
                    ("Zstd level", settings.output.zstd_level.to_string()),
                    ("Scopus API URL", settings.scopus.api_url().to_string()),
                    ("Page size", settings.scopus.page_size.to_string()),
                    ("Timeout", format!("{}s", requests.timeout_secs)),
                    ("Max retries", requests.max_retries.to_string()),
                    ("Features", cmd::compiled_features().join(", ")),
                ],
            );
            Ok(())
        }
    }
}
