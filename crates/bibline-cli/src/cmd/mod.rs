//! Subcommands and the helpers they share

pub mod analyze;
pub mod clean;
pub mod extract;

use std::path::Path;

use anyhow::{Context, Result};
use bibline_core::PipelineError;
use bibline_store::{EnvironmentFingerprint, Layout, RunId, run_id_from_table};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

/// Print a key-value summary table on stderr
pub fn print_summary(title: &str, rows: &[(&str, String)]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(title).fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}

/// Optional capabilities compiled into this binary.
pub fn compiled_features() -> Vec<&'static str> {
    let mut features = Vec::new();
    if bibline_core::columnar_available() {
        features.push("parquet");
    }
    if bibline_analysis::figures_available() {
        features.push("figures");
    }
    features
}

pub fn fingerprint(layout: &Layout) -> EnvironmentFingerprint {
    EnvironmentFingerprint::capture(
        "bibline",
        env!("CARGO_PKG_VERSION"),
        &compiled_features(),
        layout.base(),
    )
}

/// Where a phase's run id came from.
#[derive(Debug)]
pub struct ResolvedRun {
    pub run_id: RunId,
    pub auto: bool,
}

impl ResolvedRun {
    pub fn explicit(value: &str) -> Result<Self, PipelineError> {
        Ok(Self {
            run_id: RunId::parse(value)?,
            auto: false,
        })
    }

    pub fn auto(run_id: RunId) -> Self {
        Self { run_id, auto: true }
    }

    /// `RUN_ID=<id>` for auto-resolved runs, so scripts can chain phases
    /// and find the logs of a failed one.
    pub fn announcement(&self) -> Option<String> {
        self.auto.then(|| format!("RUN_ID={}", self.run_id))
    }
}

/// Run id for clean/analyze: explicit, else taken from `--input`'s file
/// name, else the newest upstream table.
pub fn resolve_downstream_run(
    run_id: Option<&str>,
    input: Option<&Path>,
    latest: impl FnOnce() -> Result<Option<RunId>>,
    upstream: &str,
) -> Result<ResolvedRun> {
    if let Some(value) = run_id {
        return Ok(ResolvedRun::explicit(value)?);
    }
    if let Some(input) = input {
        let run = run_id_from_table(input).unwrap_or_else(|| {
            let run = RunId::generate();
            log::info!("No run id in {}; using {run}", input.display());
            run
        });
        return Ok(ResolvedRun::auto(run));
    }
    match latest()? {
        Some(run) => {
            log::info!("Using latest {upstream} run {run}");
            Ok(ResolvedRun::auto(run))
        }
        None => Err(PipelineError::config(
            "run_id",
            format!("no {upstream} tables found; pass --run-id or --input"),
        )
        .into()),
    }
}

/// Print the run id when it was auto-resolved, mirror this phase's log lines
/// into `logs/<phase>_<run>.log` and drop temporary files an interrupted run
/// left behind. Runs before any phase work, so a failing phase still names
/// its run.
pub fn begin_phase(layout: &Layout, phase: &str, resolved: &ResolvedRun) -> Result<()> {
    if let Some(line) = resolved.announcement() {
        println!("{line}");
    }
    let run = &resolved.run_id;
    let path = layout.log_file(phase, run);
    bibline_core::attach_log_file(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    log::info!("{phase} run_id={run} base={}", layout.base().display());
    layout.sweep_stale_tmp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_run_id_wins() {
        let resolved =
            resolve_downstream_run(Some("r1"), Some(Path::new("scopus_search_r2.csv")), || Ok(None), "raw")
                .unwrap();
        assert_eq!(resolved.run_id.as_str(), "r1");
        assert!(!resolved.auto);
    }

    #[test]
    fn run_id_from_input_name() {
        let resolved = resolve_downstream_run(
            None,
            Some(Path::new("/data/raw/scopus_search_r2.parquet")),
            || panic!("latest lookup not expected"),
            "raw",
        )
        .unwrap();
        assert_eq!(resolved.run_id.as_str(), "r2");
        assert!(resolved.auto);
    }

    #[test]
    fn latest_upstream_run() {
        let resolved =
            resolve_downstream_run(None, None, || Ok(Some(RunId::parse("r3")?)), "cleaned").unwrap();
        assert_eq!(resolved.run_id.as_str(), "r3");
    }

    #[test]
    fn nothing_to_resolve_is_config_error() {
        let err = resolve_downstream_run(None, None, || Ok(None), "raw").unwrap_err();
        assert_eq!(err.downcast_ref::<PipelineError>().map(|e| e.exit_code()), Some(2));
    }

    #[test]
    fn only_auto_runs_are_announced() {
        let auto = ResolvedRun::auto(RunId::parse("run-20240101T000000Z").unwrap());
        assert_eq!(auto.announcement().as_deref(), Some("RUN_ID=run-20240101T000000Z"));
        assert_eq!(ResolvedRun::explicit("r1").unwrap().announcement(), None);
    }

    #[test]
    fn begin_phase_prepares_log_before_work() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let resolved = ResolvedRun::auto(RunId::parse("r9").unwrap());
        std::fs::create_dir_all(layout.raw_dir()).unwrap();
        let stale = layout.raw_dir().join("scopus_search_r9.csv.tmp");
        std::fs::write(&stale, b"partial").unwrap();

        begin_phase(&layout, "clean", &resolved).unwrap();
        assert!(!stale.exists());
    }

    #[test]
    fn invalid_run_id_rejected() {
        assert!(ResolvedRun::explicit("../escape").is_err());
    }
}
