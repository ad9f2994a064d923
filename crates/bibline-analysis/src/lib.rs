//! Cleaning and trend analysis of bibliographic record tables
//!
//! - [`clean`]: deduplication and light normalization of the raw table
//! - [`descriptive`]: journal / author / keyword frequency tables and field coverage
//! - [`trends`]: yearly series, year-over-year change, CAGR, five-year momentum
//! - [`figures`]: chart rendering behind the [`ChartRenderer`] seam
//! - [`runner`]: the `clean` and `analyze` phases with their manifests

pub mod clean;
pub mod descriptive;
pub mod figures;
pub mod manifest;
pub mod runner;
pub mod trends;

pub use clean::{CleanedTable, CleaningReport, DedupKey, clean, deduplicate, normalize};
pub use descriptive::{Coverage, FrequencyTable};
pub use figures::{
    ChartLabels, ChartRenderer, NoopRenderer, PUBS_BY_YEAR_LABELS, YOY_GROWTH_LABELS, figures_available,
    select_renderer,
};
pub use manifest::{AnalysisManifest, CleaningManifest};
pub use runner::{AnalyzeOptions, AnalyzeReport, CleanOptions, CleanReport, run_analyze, run_clean};
pub use trends::{CagrSummary, Momentum, SeriesBuild, YearlySeries, YoyRow};
