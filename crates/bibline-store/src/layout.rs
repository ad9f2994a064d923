//! Run identifiers and the on-disk artifact layout
//!
//! ```text
//! <base>/
//!   data/raw/scopus_search_<run>.{parquet|csv}
//!   data/processed/scopus_clean_<run>.{parquet|csv}
//!   outputs/methods/<kind>_manifest_<run>.json
//!   outputs/analysis/<table>_<run>.csv
//!   outputs/figures/<chart>_<run>.png
//!   logs/<phase>_<run>.log
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use bibline_core::{PipelineError, cleanup_tmp_files};

/// Prefix of auto-generated run identifiers.
pub const RUN_ID_PREFIX: &str = "run-";

const RAW_STEM: &str = "scopus_search_";
const CLEAN_STEM: &str = "scopus_clean_";

/// Identifier scoping every artifact of one pipeline execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(String);

impl RunId {
    /// `run-%Y%m%dT%H%M%SZ` from the current UTC time.
    pub fn generate() -> Self {
        Self::at(chrono::Utc::now())
    }

    pub fn at(time: chrono::DateTime<chrono::Utc>) -> Self {
        Self(format!("{RUN_ID_PREFIX}{}", time.format("%Y%m%dT%H%M%SZ")))
    }

    /// Validate a user-supplied identifier. It becomes part of file names,
    /// so only `[A-Za-z0-9._-]` is accepted.
    pub fn parse(value: &str) -> Result<Self, PipelineError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(PipelineError::config("run_id", "must not be empty"));
        }
        if let Some(bad) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(PipelineError::config(
                "run_id",
                format!("invalid character {bad:?} in {value:?}"),
            ));
        }
        if value.chars().all(|c| c == '.') {
            return Err(PipelineError::config("run_id", format!("{value:?} is not a name")));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Artifact paths under a base directory.
#[derive(Debug, Clone)]
pub struct Layout {
    base: PathBuf,
}

impl Layout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.base.join("data").join("raw")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.base.join("data").join("processed")
    }

    pub fn methods_dir(&self) -> PathBuf {
        self.base.join("outputs").join("methods")
    }

    pub fn analysis_dir(&self) -> PathBuf {
        self.base.join("outputs").join("analysis")
    }

    pub fn figures_dir(&self) -> PathBuf {
        self.base.join("outputs").join("figures")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base.join("logs")
    }

    /// Raw table path without extension (format chosen at write time).
    pub fn raw_table(&self, run: &RunId) -> PathBuf {
        self.raw_dir().join(format!("{RAW_STEM}{run}"))
    }

    /// Cleaned table path without extension.
    pub fn clean_table(&self, run: &RunId) -> PathBuf {
        self.processed_dir().join(format!("{CLEAN_STEM}{run}"))
    }

    pub fn analysis_table(&self, name: &str, run: &RunId) -> PathBuf {
        self.analysis_dir().join(format!("{name}_{run}.csv"))
    }

    pub fn figure(&self, name: &str, run: &RunId) -> PathBuf {
        self.figures_dir().join(format!("{name}_{run}.png"))
    }

    pub fn log_file(&self, phase: &str, run: &RunId) -> PathBuf {
        self.logs_dir().join(format!("{phase}_{run}.log"))
    }

    /// Run id of the most recently modified raw table.
    pub fn latest_raw_run(&self) -> Result<Option<RunId>> {
        latest_run(&self.raw_dir(), RAW_STEM)
    }

    /// Run id of the most recently modified cleaned table.
    pub fn latest_clean_run(&self) -> Result<Option<RunId>> {
        latest_run(&self.processed_dir(), CLEAN_STEM)
    }

    /// Remove `.tmp` files an interrupted run left next to tables and manifests.
    pub fn sweep_stale_tmp(&self) -> Result<()> {
        for dir in [self.raw_dir(), self.processed_dir(), self.methods_dir()] {
            cleanup_tmp_files(&dir)
                .with_context(|| format!("failed to clean {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Newest `<stem><run>.{parquet,csv}` in `dir` by modification time.
fn latest_run(dir: &Path, stem: &str) -> Result<Option<RunId>> {
    let mut newest: Option<(SystemTime, RunId)> = None;
    for ext in ["parquet", "csv"] {
        let pattern = dir.join(format!("{stem}*.{ext}"));
        let pattern_str = pattern.to_string_lossy();
        for path in glob::glob(&pattern_str)
            .context("invalid glob pattern")?
            .filter_map(|e| e.ok())
        {
            let Some(run) = run_from_path(&path, stem) else {
                continue;
            };
            let modified = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .with_context(|| format!("failed to stat {}", path.display()))?;
            if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
                newest = Some((modified, run));
            }
        }
    }
    Ok(newest.map(|(_, run)| run))
}

/// Run id embedded in a raw or cleaned table file name.
pub fn run_id_from_table(path: &Path) -> Option<RunId> {
    [RAW_STEM, CLEAN_STEM]
        .into_iter()
        .find_map(|stem| run_from_path(path, stem))
}

fn run_from_path(path: &Path, stem: &str) -> Option<RunId> {
    let name = path.file_stem()?.to_str()?;
    let run = name.strip_prefix(stem)?;
    RunId::parse(run).ok()
}
