//! Search manifest body

use bibline_store::EnvironmentFingerprint;
use serde::Serialize;

use crate::api::View;
use crate::config::Strategy;

/// Provenance of one extraction. The writer adds kind, run id, schema
/// version and timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct SearchManifest {
    pub query: String,
    pub database: String,
    pub notes: Option<String>,
    pub config_path: String,
    pub config_hash: String,
    pub strategy_planned: Strategy,
    pub strategy_used: Strategy,
    pub use_cursor_preferred: bool,
    pub subscriber_mode: bool,
    pub force_slicing: bool,
    pub view: Option<View>,
    pub n_results_estimated: u64,
    pub n_records_downloaded: usize,
    pub years_covered: Option<Vec<i32>>,
    pub columns_present: Vec<String>,
    pub raw_output_path: Option<String>,
    pub raw_output_format: Option<String>,
    pub raw_output_hash: Option<String>,
    /// Where each credential was found; values are never recorded.
    pub credential_sources: Vec<String>,
    pub client_config_path: Option<String>,
    pub dry_run: bool,
    pub environment: EnvironmentFingerprint,
}
