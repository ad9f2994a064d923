//! Clean subcommand - deduplicate and normalize a raw table

use std::path::PathBuf;

use anyhow::Result;
use bibline_analysis::{CleanOptions, run_clean};
use bibline_core::{FormatPreference, ProgressContext, fmt_num};
use bibline_store::Layout;
use clap::{Args, ValueEnum};

use super::{begin_phase, fingerprint, print_summary, resolve_downstream_run};
use crate::config::Settings;

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Run identifier (default: latest raw table by modification time)
    #[arg(long)]
    pub run_id: Option<String>,

    /// Raw table to clean instead of data/raw/scopus_search_<run>
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Cleaned table format
    #[arg(long, value_enum)]
    pub write_format: Option<WriteFormat>,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum WriteFormat {
    Auto,
    Parquet,
    Csv,
}

impl From<WriteFormat> for FormatPreference {
    fn from(f: WriteFormat) -> Self {
        match f {
            WriteFormat::Auto => FormatPreference::Auto,
            WriteFormat::Parquet => FormatPreference::Parquet,
            WriteFormat::Csv => FormatPreference::Csv,
        }
    }
}

pub fn run(args: CleanArgs, settings: &Settings, layout: &Layout, progress: &ProgressContext) -> Result<()> {
    let resolved = resolve_downstream_run(
        args.run_id.as_deref(),
        args.input.as_deref(),
        || layout.latest_raw_run(),
        "raw",
    )?;
    begin_phase(layout, "clean", &resolved)?;

    let write_format = match args.write_format {
        Some(f) => f.into(),
        None if settings.output.prefer_parquet => FormatPreference::Auto,
        None => FormatPreference::Csv,
    };
    let opts = CleanOptions {
        layout: layout.clone(),
        run_id: resolved.run_id.clone(),
        input: args.input,
        write_format,
        zstd_level: settings.output.zstd_level,
        environment: fingerprint(layout),
    };

    let report = run_clean(&opts, progress)?;

    let r = &report.report;
    let mut rows = vec![
        ("Run id", report.run_id.to_string()),
        (
            "Rows",
            format!(
                "{} -> {} ({} duplicates)",
                fmt_num(r.rows_before),
                fmt_num(r.rows_after),
                fmt_num(r.duplicates_removed)
            ),
        ),
        ("Dedup key", r.dedup_key.to_string()),
        (
            "Cleaned table",
            format!("{} ({})", report.output.path.display(), report.output.format),
        ),
    ];
    for (field, cov) in &report.coverage {
        rows.push((
            "Coverage",
            format!("{field}: {:.1}% ({}/{})", cov.pct_nonnull * 100.0, cov.n_nonnull, cov.n_total),
        ));
    }
    rows.push(("Manifest", report.manifest_path.display().to_string()));
    rows.push(("Time", format!("{:.1}s", report.elapsed.as_secs_f64())));
    print_summary("Clean", &rows);
    Ok(())
}
