//! Analyze subcommand - yearly trends from a cleaned table

use std::path::PathBuf;

use anyhow::Result;
use bibline_analysis::{AnalyzeOptions, run_analyze, select_renderer};
use bibline_core::{ProgressContext, fmt_num};
use bibline_store::Layout;
use clap::Args;

use super::{begin_phase, fingerprint, print_summary, resolve_downstream_run};

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Run identifier (default: latest cleaned table by modification time)
    #[arg(long)]
    pub run_id: Option<String>,

    /// Cleaned table to analyze instead of data/processed/scopus_clean_<run>
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Draw PNG charts (skipped with a notice when unavailable)
    #[arg(long)]
    pub figures: bool,

    /// Earliest publication year to include
    #[arg(long)]
    pub min_year: Option<i32>,

    /// Latest publication year to include
    #[arg(long)]
    pub max_year: Option<i32>,

    /// List years without publications explicitly with a zero count
    #[arg(long)]
    pub fill_gaps: bool,
}

pub fn run(args: AnalyzeArgs, layout: &Layout, progress: &ProgressContext) -> Result<()> {
    let resolved = resolve_downstream_run(
        args.run_id.as_deref(),
        args.input.as_deref(),
        || layout.latest_clean_run(),
        "cleaned",
    )?;
    begin_phase(layout, "analyze", &resolved)?;

    let opts = AnalyzeOptions {
        layout: layout.clone(),
        run_id: resolved.run_id.clone(),
        input: args.input,
        figures: args.figures,
        min_year: args.min_year,
        max_year: args.max_year,
        fill_gaps: args.fill_gaps,
        environment: fingerprint(layout),
    };

    let renderer = select_renderer();
    let report = run_analyze(&opts, renderer.as_ref(), progress)?;

    let period = match (report.cagr.start_year, report.cagr.end_year) {
        (Some(start), Some(end)) => format!("{start}-{end}"),
        _ => "-".to_string(),
    };
    let total: u64 = report.series.iter().map(|(_, c)| c).sum();
    let mut rows = vec![
        ("Run id", report.run_id.to_string()),
        ("Years", report.series.len().to_string()),
        ("Publications", fmt_num(total as usize)),
        ("Excluded (no year)", fmt_num(report.excluded_missing_year)),
        ("Excluded (filter)", fmt_num(report.excluded_by_filter)),
        ("Period", period),
        ("CAGR", format!("{:.2}%", report.cagr.cagr * 100.0)),
    ];
    if let Some(ratio) = report.momentum.avg_last5_vs_prev5 {
        rows.push(("Last 5 vs previous 5", format!("{ratio:.2}x")));
    }
    if args.figures {
        let figures = match &report.figures_skipped {
            Some(reason) if report.figures.is_empty() => format!("skipped: {reason}"),
            Some(reason) => format!("{} written, partly skipped: {reason}", report.figures.len()),
            None => format!("{} written", report.figures.len()),
        };
        rows.push(("Figures", figures));
    }
    rows.push(("Manifest", report.manifest_path.display().to_string()));
    rows.push(("Time", format!("{:.1}s", report.elapsed.as_secs_f64())));
    print_summary("Analyze", &rows);
    Ok(())
}
