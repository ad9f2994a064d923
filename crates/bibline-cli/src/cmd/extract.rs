//! Extract subcommand - run the Scopus search for a configuration

use std::path::PathBuf;

use anyhow::Result;
use bibline_core::{FormatPreference, ProgressContext, fmt_num};
use bibline_scopus::credentials::EnvSnapshot;
use bibline_scopus::{ExtractOptions, View, runner};
use bibline_store::{Layout, RunId};
use clap::Args;

use super::{ResolvedRun, begin_phase, fingerprint, print_summary};
use crate::config::Settings;

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Search configuration (YAML)
    #[arg(long, default_value = "config/search.yaml")]
    pub config: PathBuf,

    /// Run identifier (default: generated from the current UTC time)
    #[arg(long)]
    pub run_id: Option<String>,

    /// Directory holding the Scopus client config (scopus-client.toml)
    #[arg(long, alias = "pybliometrics-config-dir", default_value = "config/scopus/")]
    pub client_config_dir: PathBuf,

    /// File containing the Scopus API key
    #[arg(long, default_value = "config/scopus_api_key.txt")]
    pub scopus_api_key_file: PathBuf,

    /// File containing an institutional token
    #[arg(long, default_value = "config/inst_token.txt")]
    pub inst_token_file: PathBuf,

    /// Result view requested from Scopus
    #[arg(long, value_enum)]
    pub view: Option<View>,

    /// Always use year-sliced pagination
    #[arg(long)]
    pub force_slicing: bool,

    /// Validate configuration and credentials, write only the manifest
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(args: ExtractArgs, settings: &Settings, layout: &Layout, progress: &ProgressContext) -> Result<()> {
    let resolved = match args.run_id.as_deref() {
        Some(value) => ResolvedRun::explicit(value)?,
        None => ResolvedRun::auto(RunId::generate()),
    };
    begin_phase(layout, "extract", &resolved)?;

    let base = layout.base();
    let opts = ExtractOptions {
        layout: layout.clone(),
        run_id: resolved.run_id.clone(),
        config_path: base.join(&args.config),
        client_config_dir: base.join(&args.client_config_dir),
        api_key_file: Some(base.join(&args.scopus_api_key_file)),
        inst_token_file: Some(base.join(&args.inst_token_file)),
        view: args.view,
        force_slicing: args.force_slicing,
        dry_run: args.dry_run,
        api_url: settings.scopus.api_url().to_string(),
        page_size: settings.scopus.page_size,
        requests: settings.scopus.requests(),
        write_format: if settings.output.prefer_parquet {
            FormatPreference::Auto
        } else {
            FormatPreference::Csv
        },
        zstd_level: settings.output.zstd_level,
        environment: fingerprint(layout),
    };

    log::info!("Extracting with config {}", opts.config_path.display());
    let report = runner::run(&opts, &EnvSnapshot::capture(), progress)?;

    let outcome = &report.outcome;
    let years = match &outcome.years_covered {
        Some(years) if !years.is_empty() => format!(
            "{}..{} ({} with results)",
            years.first().copied().unwrap_or_default(),
            years.last().copied().unwrap_or_default(),
            years.len()
        ),
        _ => "-".to_string(),
    };
    print_summary(
        "Extract",
        &[
            ("Run id", report.run_id.to_string()),
            (
                "Strategy",
                format!("{} (planned {})", outcome.strategy_used, outcome.strategy_planned),
            ),
            ("Estimated", fmt_num(outcome.estimated as usize)),
            ("Downloaded", fmt_num(outcome.downloaded)),
            ("Years", years),
            (
                "Raw table",
                report
                    .raw_output
                    .as_ref()
                    .map_or_else(|| "(dry run)".to_string(), |w| w.path.display().to_string()),
            ),
            ("Manifest", report.manifest_path.display().to_string()),
            ("Time", format!("{:.1}s", report.elapsed.as_secs_f64())),
        ],
    );
    Ok(())
}
