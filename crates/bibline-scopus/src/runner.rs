//! Extract phase: configuration → credentials → executor → raw table + manifest

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use bibline_core::{FormatPreference, ProgressContext, WrittenTable, write_table};
use bibline_store::{EnvironmentFingerprint, Layout, ManifestKind, ManifestWriter, RunId, digest_file};

use crate::api::{ScopusClient, SearchClient, View};
use crate::client_config::{ClientConfig, RequestSettings};
use crate::config::{LoadedSearchConfig, SearchConfig};
use crate::credentials::{self, CredentialInputs, Credentials, EnvSnapshot};
use crate::executor::{ExecuteOptions, ExtractionOutcome, ExtractionPlan, QueryExecutor};
use crate::manifest::SearchManifest;

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub layout: Layout,
    pub run_id: RunId,
    pub config_path: PathBuf,
    pub client_config_dir: PathBuf,
    pub api_key_file: Option<PathBuf>,
    pub inst_token_file: Option<PathBuf>,
    pub view: Option<View>,
    pub force_slicing: bool,
    pub dry_run: bool,
    pub api_url: String,
    pub page_size: usize,
    /// Written into a synthesized client config.
    pub requests: RequestSettings,
    pub write_format: FormatPreference,
    pub zstd_level: i32,
    pub environment: EnvironmentFingerprint,
}

/// Everything validated before the first network call.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub search: LoadedSearchConfig,
    pub plan: ExtractionPlan,
    pub credentials: Credentials,
    pub client_config: Option<ClientConfig>,
}

#[derive(Debug)]
pub struct ExtractReport {
    pub run_id: RunId,
    pub outcome: ExtractionOutcome,
    pub raw_output: Option<WrittenTable>,
    pub manifest_path: PathBuf,
    pub elapsed: std::time::Duration,
}

/// Load the configuration, plan the strategy and resolve credentials.
/// Configuration and credential errors surface here, before any artifact.
pub fn prepare(opts: &ExtractOptions, env: &EnvSnapshot) -> Result<Prepared> {
    let search = SearchConfig::load(&opts.config_path)?;
    log::info!(
        "Loaded search config {} (database {})",
        search.path.display(),
        search.config.database
    );
    let plan = ExtractionPlan::new(&search.config, opts.force_slicing)?;

    let client_config = ClientConfig::load_optional(&opts.client_config_dir)?;
    let credentials = credentials::resolve(&CredentialInputs {
        api_key_file: opts.api_key_file.clone(),
        inst_token_file: opts.inst_token_file.clone(),
        env: env.clone(),
        client_config: client_config.clone(),
    })?;

    Ok(Prepared {
        search,
        plan,
        credentials,
        client_config,
    })
}

/// Run the extract phase against the live Scopus API.
pub fn run(opts: &ExtractOptions, env: &EnvSnapshot, progress: &ProgressContext) -> Result<ExtractReport> {
    let mut prepared = prepare(opts, env)?;
    if opts.dry_run {
        return execute(opts, &prepared, None, progress);
    }

    let client_config = match prepared.client_config.take() {
        Some(cfg) => cfg,
        None => ClientConfig::synthesize(
            &opts.client_config_dir,
            &prepared.credentials.api_key,
            opts.requests,
            opts.layout.base(),
        )?,
    };
    let mut client = ScopusClient::new(
        opts.api_url.clone(),
        prepared.credentials.clone(),
        client_config.timeout(),
        client_config.max_retries(),
    )?;
    prepared.client_config = Some(client_config);
    execute(opts, &prepared, Some(&mut client), progress)
}

/// Execute a prepared extraction. The client is never touched on a dry run.
pub fn execute(
    opts: &ExtractOptions,
    prepared: &Prepared,
    client: Option<&mut dyn SearchClient>,
    progress: &ProgressContext,
) -> Result<ExtractReport> {
    let start = Instant::now();
    let config = &prepared.search.config;
    log::info!(
        "Extract run_id={} strategy={} query={}",
        opts.run_id,
        prepared.plan.strategy,
        config.query
    );

    let outcome = match client {
        _ if opts.dry_run => {
            log::info!("Dry run: skipping the search, recording the planned strategy");
            ExtractionOutcome::dry_run(&prepared.plan)
        }
        Some(client) => {
            let exec_opts = ExecuteOptions {
                view: opts.view,
                page_size: opts.page_size,
            };
            QueryExecutor::new(client, exec_opts, progress).execute(config, &prepared.plan)?
        }
        None => anyhow::bail!("no search client available for a non-dry run"),
    };

    if !outcome.dry_run && outcome.table.is_empty() {
        log::warn!("No records downloaded for query");
    }

    let raw_output = if outcome.dry_run {
        None
    } else {
        let written = write_table(
            &outcome.table,
            &opts.layout.raw_table(&opts.run_id),
            opts.write_format,
            opts.zstd_level,
        )
        .context("failed to write raw table")?;
        log::info!("Saved raw data to {}", written.path.display());
        Some(written)
    };

    let raw_output_hash = raw_output
        .as_ref()
        .map(|w| digest_file(&w.path))
        .transpose()?;

    let manifest = SearchManifest {
        query: config.query.clone(),
        database: config.database.clone(),
        notes: config.notes.clone(),
        config_path: prepared.search.path.display().to_string(),
        config_hash: prepared.search.hash.clone(),
        strategy_planned: outcome.strategy_planned,
        strategy_used: outcome.strategy_used,
        use_cursor_preferred: config.use_cursor_preferred,
        subscriber_mode: config.subscriber_mode,
        force_slicing: opts.force_slicing,
        view: opts.view,
        n_results_estimated: outcome.estimated,
        n_records_downloaded: outcome.downloaded,
        years_covered: outcome.years_covered.clone(),
        columns_present: outcome.table.columns().to_vec(),
        raw_output_path: raw_output.as_ref().map(|w| w.path.display().to_string()),
        raw_output_format: raw_output.as_ref().map(|w| w.format.to_string()),
        raw_output_hash,
        credential_sources: prepared.credentials.describe_sources(),
        client_config_path: prepared
            .client_config
            .as_ref()
            .map(|c| c.path().display().to_string()),
        dry_run: outcome.dry_run,
        environment: opts.environment.clone(),
    };
    let manifest_path =
        ManifestWriter::for_layout(&opts.layout).write(ManifestKind::Search, &opts.run_id, &manifest)?;

    Ok(ExtractReport {
        run_id: opts.run_id.clone(),
        outcome,
        raw_output,
        manifest_path,
        elapsed: start.elapsed(),
    })
}
