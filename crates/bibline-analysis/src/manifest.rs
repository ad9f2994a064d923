//! Cleaning and analysis manifest bodies

use std::collections::BTreeMap;

use bibline_store::EnvironmentFingerprint;
use serde::Serialize;

use crate::clean::CleaningReport;
use crate::descriptive::Coverage;
use crate::trends::{CagrSummary, Momentum};

#[derive(Debug, Clone, Serialize)]
pub struct CleaningManifest {
    pub input_path: String,
    pub input_format: String,
    pub input_hash: String,
    /// Upstream search manifest, absent when `--input` bypassed it.
    pub search_manifest: Option<String>,
    #[serde(flatten)]
    pub report: CleaningReport,
    pub output_path: String,
    pub output_format: String,
    pub output_hash: String,
    pub coverage: BTreeMap<String, Coverage>,
    pub output_tables: BTreeMap<String, String>,
    pub notes: Vec<String>,
    pub environment: EnvironmentFingerprint,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Period {
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisManifest {
    pub input_path: String,
    pub input_hash: String,
    pub cleaning_manifest: Option<String>,
    pub year_column: Option<String>,
    pub period: Period,
    pub cagr: f64,
    pub cagr_detail: CagrSummary,
    pub momentum: Momentum,
    pub rows_total: usize,
    pub excluded_missing_year: usize,
    pub excluded_by_filter: usize,
    pub min_year: Option<i32>,
    pub max_year: Option<i32>,
    pub fill_gaps: bool,
    pub output_paths: BTreeMap<String, String>,
    pub figures: Vec<String>,
    /// Set when figures were requested but not drawn.
    pub figures_skipped: Option<String>,
    pub yoy_pct_units: &'static str,
    pub environment: EnvironmentFingerprint,
}
