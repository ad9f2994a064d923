//! Clean and analyze phases

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bibline_core::{
    Capability, FormatPreference, PipelineError, ProgressContext, WrittenTable, read_table,
    write_table,
};
use bibline_store::{EnvironmentFingerprint, Layout, ManifestKind, ManifestWriter, RunId, digest_file};

use crate::clean::{CleaningReport, clean};
use crate::descriptive::{self, Coverage, FrequencyTable};
use crate::figures::{ChartLabels, ChartRenderer, PUBS_BY_YEAR_LABELS, YOY_GROWTH_LABELS};
use crate::manifest::{AnalysisManifest, CleaningManifest, Period};
use crate::trends::{self, CagrSummary, Momentum, YearlySeries, YoyRow};

#[derive(Debug, Clone)]
pub struct CleanOptions {
    pub layout: Layout,
    pub run_id: RunId,
    /// Explicit raw table; skips the search manifest check.
    pub input: Option<PathBuf>,
    pub write_format: FormatPreference,
    pub zstd_level: i32,
    pub environment: EnvironmentFingerprint,
}

#[derive(Debug)]
pub struct CleanReport {
    pub run_id: RunId,
    pub report: CleaningReport,
    pub output: WrittenTable,
    pub tables: BTreeMap<String, PathBuf>,
    pub coverage: BTreeMap<String, Coverage>,
    pub notes: Vec<String>,
    pub manifest_path: PathBuf,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub layout: Layout,
    pub run_id: RunId,
    /// Explicit cleaned table; skips the cleaning manifest check.
    pub input: Option<PathBuf>,
    pub figures: bool,
    pub min_year: Option<i32>,
    pub max_year: Option<i32>,
    pub fill_gaps: bool,
    pub environment: EnvironmentFingerprint,
}

#[derive(Debug)]
pub struct AnalyzeReport {
    pub run_id: RunId,
    pub series: YearlySeries,
    pub yoy: Vec<YoyRow>,
    pub cagr: CagrSummary,
    pub momentum: Momentum,
    pub excluded_missing_year: usize,
    pub excluded_by_filter: usize,
    pub outputs: BTreeMap<String, PathBuf>,
    pub figures: Vec<PathBuf>,
    pub figures_skipped: Option<String>,
    pub manifest_path: PathBuf,
    pub elapsed: Duration,
}

/// Upstream manifest path, or `None` when an explicit input bypasses it.
fn upstream_manifest(
    layout: &Layout,
    kind: ManifestKind,
    run: &RunId,
    input: Option<&Path>,
) -> Result<Option<PathBuf>> {
    match input {
        Some(path) => {
            log::info!("Using explicit input {}; skipping {kind} manifest check", path.display());
            Ok(None)
        }
        None => ManifestWriter::for_layout(layout).require(kind, run).map(Some),
    }
}

/// Deduplicate and normalize a raw table, then write the cleaned table, the
/// descriptive tables and the cleaning manifest.
pub fn run_clean(opts: &CleanOptions, progress: &ProgressContext) -> Result<CleanReport> {
    let start = Instant::now();
    let layout = &opts.layout;
    let run = &opts.run_id;
    let stage = progress.stage_line("clean");

    let search_manifest = upstream_manifest(layout, ManifestKind::Search, run, opts.input.as_deref())?;
    let input_base = opts.input.clone().unwrap_or_else(|| layout.raw_table(run));

    stage.set_message("reading raw table");
    let (raw, input_path, input_format) = read_table(&input_base)?;
    let input_hash = digest_file(&input_path)?;
    log::info!("Cleaning run_id={run} input={} ({} rows)", input_path.display(), raw.len());

    stage.set_message("deduplicating");
    let cleaned = clean(&raw);

    stage.set_message("writing cleaned table");
    let output = write_table(&cleaned.table, &layout.clean_table(run), opts.write_format, opts.zstd_level)
        .context("failed to write cleaned table")?;
    let output_hash = digest_file(&output.path)?;
    log::info!("Wrote cleaned data to {}", output.path.display());

    stage.set_message("descriptive tables");
    let mut notes = Vec::new();
    let mut tables = BTreeMap::new();
    let descriptive_tables = [
        ("top_journals", descriptive::top_journals(&cleaned.table), "journal", "Journal column not found"),
        ("top_authors", descriptive::top_authors(&cleaned.table), "item", "Author names missing"),
        ("keyword_freq", descriptive::keyword_freq(&cleaned.table), "item", "Keyword column not found"),
    ];
    for (name, freq, label, missing) in descriptive_tables {
        let freq = match freq {
            Some(freq) if !freq.is_empty() => freq,
            other => {
                let reason = if other.is_some() { "no values present" } else { missing };
                let note = format!("{reason}; {name} is empty.");
                log::warn!("{note}");
                notes.push(note);
                FrequencyTable::empty(label)
            }
        };
        let path = layout.analysis_table(name, run);
        freq.write_csv(&path)?;
        tables.insert(name.to_string(), path);
    }
    let coverage = descriptive::coverage(&cleaned.table);

    let manifest = CleaningManifest {
        input_path: input_path.display().to_string(),
        input_format: input_format.to_string(),
        input_hash,
        search_manifest: search_manifest.map(|p| p.display().to_string()),
        report: cleaned.report.clone(),
        output_path: output.path.display().to_string(),
        output_format: output.format.to_string(),
        output_hash,
        coverage: coverage.clone(),
        output_tables: tables
            .iter()
            .map(|(k, v)| (k.clone(), v.display().to_string()))
            .collect(),
        notes: notes.clone(),
        environment: opts.environment.clone(),
    };
    let manifest_path = ManifestWriter::for_layout(layout).write(ManifestKind::Cleaning, run, &manifest)?;
    stage.finish_and_clear();

    Ok(CleanReport {
        run_id: run.clone(),
        report: cleaned.report,
        output,
        tables,
        coverage,
        notes,
        manifest_path,
        elapsed: start.elapsed(),
    })
}

/// Aggregate a cleaned table into the yearly series, its growth tables and
/// optional charts, then write the analysis manifest.
pub fn run_analyze(
    opts: &AnalyzeOptions,
    renderer: &dyn ChartRenderer,
    progress: &ProgressContext,
) -> Result<AnalyzeReport> {
    let start = Instant::now();
    let layout = &opts.layout;
    let run = &opts.run_id;
    trends::validate_year_filter(opts.min_year, opts.max_year)?;
    let stage = progress.stage_line("analyze");

    let cleaning_manifest = upstream_manifest(layout, ManifestKind::Cleaning, run, opts.input.as_deref())?;
    let input_base = opts.input.clone().unwrap_or_else(|| layout.clean_table(run));

    stage.set_message("reading cleaned table");
    let (table, input_path, _) = read_table(&input_base)?;
    let input_hash = digest_file(&input_path)?;
    log::info!("Analyzing run_id={run} input={}", input_path.display());

    stage.set_message("aggregating");
    let build = YearlySeries::build(&table, opts.min_year, opts.max_year)?;
    let mut series = build.series;
    if opts.fill_gaps {
        series.fill_gaps();
    }
    let yoy = series.yoy();
    let cagr = series.cagr();
    let momentum = series.momentum();

    stage.set_message("writing tables");
    let mut outputs = BTreeMap::new();
    let path = layout.analysis_table("pubs_by_year", run);
    series.write_csv(&path)?;
    outputs.insert("pubs_by_year".to_string(), path);
    let path = layout.analysis_table("yoy_growth", run);
    trends::write_yoy_csv(&yoy, &path)?;
    outputs.insert("yoy_growth".to_string(), path);
    let path = layout.analysis_table("cagr", run);
    trends::write_cagr_csv(&cagr, &momentum, run.as_str(), &path)?;
    outputs.insert("cagr".to_string(), path);

    let (figures, figures_skipped) = if opts.figures {
        stage.set_message("drawing figures");
        draw_figures(layout, run, renderer, &series, &yoy)
    } else {
        (Vec::new(), None)
    };
    remove_stale_figures(layout, run, &figures)?;

    let manifest = AnalysisManifest {
        input_path: input_path.display().to_string(),
        input_hash,
        cleaning_manifest: cleaning_manifest.map(|p| p.display().to_string()),
        year_column: build.year_column,
        period: Period {
            start_year: cagr.start_year,
            end_year: cagr.end_year,
        },
        cagr: cagr.cagr,
        cagr_detail: cagr,
        momentum,
        rows_total: build.rows_total,
        excluded_missing_year: build.excluded_missing_year,
        excluded_by_filter: build.excluded_by_filter,
        min_year: opts.min_year,
        max_year: opts.max_year,
        fill_gaps: opts.fill_gaps,
        output_paths: outputs
            .iter()
            .map(|(k, v)| (k.clone(), v.display().to_string()))
            .collect(),
        figures: figures.iter().map(|p| p.display().to_string()).collect(),
        figures_skipped: figures_skipped.clone(),
        yoy_pct_units: "percent",
        environment: opts.environment.clone(),
    };
    let manifest_path = ManifestWriter::for_layout(layout).write(ManifestKind::Analysis, run, &manifest)?;
    stage.finish_and_clear();
    log::info!("Analysis outputs written to {}", layout.analysis_dir().display());

    Ok(AnalyzeReport {
        run_id: run.clone(),
        series,
        yoy,
        cagr,
        momentum,
        excluded_missing_year: build.excluded_missing_year,
        excluded_by_filter: build.excluded_by_filter,
        outputs,
        figures,
        figures_skipped,
        manifest_path,
        elapsed: start.elapsed(),
    })
}

const FIGURE_NAMES: [&str; 2] = ["pubs_by_year", "yoy_growth"];

/// Delete figures of this run that the current analysis did not draw, so the
/// figures directory matches the manifest.
fn remove_stale_figures(layout: &Layout, run: &RunId, drawn: &[PathBuf]) -> Result<()> {
    for name in FIGURE_NAMES {
        let path = layout.figure(name, run);
        if drawn.contains(&path) || !path.exists() {
            continue;
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("failed to remove stale figure {}", path.display()))?;
        log::info!("Removed stale figure {}", path.display());
    }
    Ok(())
}

/// Draw both charts. Failures are logged and reported, never propagated.
fn draw_figures(
    layout: &Layout,
    run: &RunId,
    renderer: &dyn ChartRenderer,
    series: &YearlySeries,
    yoy: &[YoyRow],
) -> (Vec<PathBuf>, Option<String>) {
    if let Some(reason) = renderer.unavailable_reason() {
        let gap = PipelineError::CapabilityUnavailable {
            capability: Capability::Charting,
            reason: reason.to_string(),
        };
        log::warn!("{gap}; skipping figures");
        return (Vec::new(), Some(reason.to_string()));
    }

    let charts: [(&str, ChartLabels<'_>, Vec<(i32, f64)>); 2] = [
        (
            FIGURE_NAMES[0],
            PUBS_BY_YEAR_LABELS,
            series.iter().map(|(y, c)| (y, c as f64)).collect(),
        ),
        (
            FIGURE_NAMES[1],
            YOY_GROWTH_LABELS,
            yoy.iter().filter_map(|r| r.yoy_pct.map(|p| (r.year, p))).collect(),
        ),
    ];

    let mut written = Vec::new();
    let mut skipped = Vec::new();
    for (name, labels, points) in charts {
        if points.is_empty() {
            log::warn!("No data for {name} figure; skipping");
            skipped.push(format!("{name}: no data"));
            continue;
        }
        let path = layout.figure(name, run);
        match renderer.line_chart(&labels, &points, &path) {
            Ok(()) => {
                log::info!("Wrote figure {}", path.display());
                written.push(path);
            }
            Err(e) => {
                log::warn!("Failed to draw {name} figure: {e:#}");
                skipped.push(format!("{name}: {e}"));
            }
        }
    }
    let skipped = (!skipped.is_empty()).then(|| skipped.join("; "));
    (written, skipped)
}
