//! Executor and extract-phase tests against an in-memory search backend.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use bibline_core::{FormatPreference, PipelineError, ProgressContext, Record};
use bibline_scopus::api::{ApiError, PageRequest, SearchClient, SearchPage, View};
use bibline_scopus::client_config::RequestSettings;
use bibline_scopus::config::{SearchConfig, Strategy};
use bibline_scopus::credentials::EnvSnapshot;
use bibline_scopus::executor::{ExecuteOptions, ExtractionPlan, QueryExecutor};
use bibline_scopus::runner::{self, ExtractOptions};
use bibline_store::{EnvironmentFingerprint, Layout, ManifestKind, ManifestWriter, RunId};

#[derive(Clone, Copy, PartialEq)]
enum CursorMode {
    Works,
    Rejects,
    Empty,
}

struct FakeScopus {
    by_query: HashMap<String, Vec<Record>>,
    cursor: CursorMode,
    fail_with: Option<fn() -> anyhow::Error>,
    calls: usize,
}

impl FakeScopus {
    fn new(cursor: CursorMode) -> Self {
        Self {
            by_query: HashMap::new(),
            cursor,
            fail_with: None,
            calls: 0,
        }
    }

    fn with(mut self, query: &str, records: Vec<Record>) -> Self {
        self.by_query.insert(query.to_string(), records);
        self
    }

    fn slice(&self, query: &str, offset: usize, count: usize) -> (u64, Vec<Record>, usize) {
        let all = self.by_query.get(query).cloned().unwrap_or_default();
        let start = offset.min(all.len());
        let end = (start + count).min(all.len());
        (all.len() as u64, all[start..end].to_vec(), end)
    }
}

impl SearchClient for FakeScopus {
    fn count(&mut self, query: &str, _view: Option<View>) -> Result<u64> {
        self.calls += 1;
        if let Some(fail) = self.fail_with {
            return Err(fail());
        }
        Ok(self.by_query.get(query).map_or(0, |r| r.len() as u64))
    }

    fn page(&mut self, request: &PageRequest<'_>) -> Result<SearchPage> {
        self.calls += 1;
        if let Some(cursor) = request.cursor {
            match self.cursor {
                CursorMode::Rejects => {
                    return Err(ApiError::CursorUnsupported("HTTP 400".into()).into());
                }
                CursorMode::Empty => {
                    return Ok(SearchPage {
                        total_results: 0,
                        entries: Vec::new(),
                        next_cursor: None,
                    });
                }
                CursorMode::Works => {}
            }
            let offset = if cursor == "*" { 0 } else { cursor.parse()? };
            let (total, entries, end) = self.slice(request.query, offset, request.count);
            return Ok(SearchPage {
                total_results: total,
                entries,
                next_cursor: Some(end.to_string()),
            });
        }
        let (total, entries, _) =
            self.slice(request.query, request.start.unwrap_or(0), request.count);
        Ok(SearchPage {
            total_results: total,
            entries,
            next_cursor: None,
        })
    }
}

/// Panics on any call; proves a code path never reaches the network.
struct Unreachable;

impl SearchClient for Unreachable {
    fn count(&mut self, _query: &str, _view: Option<View>) -> Result<u64> {
        panic!("count called");
    }

    fn page(&mut self, _request: &PageRequest<'_>) -> Result<SearchPage> {
        panic!("page called");
    }
}

const QUERY: &str = "TITLE-ABS-KEY(sukuk)";

fn rec(eid: &str, date: &str) -> Record {
    let mut r = Record::new();
    r.insert("eid", Some(eid.to_string()));
    r.insert("title", Some(format!("Paper {eid}")));
    r.insert("coverDate", Some(date.to_string()));
    r
}

fn year_query(year: i32) -> String {
    format!("{QUERY} AND PUBYEAR = {year}")
}

fn config(extra: &str) -> SearchConfig {
    SearchConfig::from_yaml(format!("query: \"{QUERY}\"\n{extra}").as_bytes()).unwrap()
}

fn sliced_backend(cursor: CursorMode) -> FakeScopus {
    FakeScopus::new(cursor)
        .with(
            QUERY,
            vec![
                rec("e1", "2020-01-01"),
                rec("e2", "2020-06-01"),
                rec("e3", "2022-01-01"),
                rec("e4", "2022-02-01"),
            ],
        )
        .with(&year_query(2020), vec![rec("e1", "2020-01-01"), rec("e2", "2020-06-01")])
        .with(
            &year_query(2022),
            vec![
                rec("e3", "2022-01-01"),
                rec("e1", "2020-01-01"),
                rec("e4", "2022-02-01"),
            ],
        )
}

fn options(page_size: usize) -> ExecuteOptions {
    ExecuteOptions {
        view: None,
        page_size,
    }
}

#[test]
fn slicing_pages_skips_empty_years_and_dedups() {
    let cfg = config("start_year: 2020\nend_year: 2022\n");
    let plan = ExtractionPlan::new(&cfg, false).unwrap();
    let mut client = sliced_backend(CursorMode::Works);
    let progress = ProgressContext::hidden();

    let out = QueryExecutor::new(&mut client, options(2), &progress)
        .execute(&cfg, &plan)
        .unwrap();

    assert_eq!(out.strategy_planned, Strategy::Slicing);
    assert_eq!(out.strategy_used, Strategy::Slicing);
    assert_eq!(out.estimated, 4);
    assert_eq!(out.years_covered, Some(vec![2020, 2022]));
    assert_eq!(out.downloaded, 4);
    let eids: Vec<_> = out.table.rows().map(|r| r.get("eid").unwrap().to_string()).collect();
    assert_eq!(eids, ["e1", "e2", "e3", "e4"]);
}

#[test]
fn cursor_follows_next_until_exhausted() {
    let cfg = config("use_cursor_preferred: true\nsubscriber_mode: true\n");
    let plan = ExtractionPlan::new(&cfg, false).unwrap();
    let mut client = sliced_backend(CursorMode::Works);
    let progress = ProgressContext::hidden();

    let out = QueryExecutor::new(&mut client, options(3), &progress)
        .execute(&cfg, &plan)
        .unwrap();

    assert_eq!(out.strategy_used, Strategy::Cursor);
    assert_eq!(out.downloaded, 4);
    assert_eq!(out.years_covered, None);
    // one estimate + two cursor pages
    assert_eq!(client.calls, 3);
}

#[test]
fn rejected_cursor_falls_back_to_slicing() {
    let cfg = config("use_cursor_preferred: true\nsubscriber_mode: true\nstart_year: 2020\nend_year: 2022\n");
    let plan = ExtractionPlan::new(&cfg, false).unwrap();
    let mut client = sliced_backend(CursorMode::Rejects);
    let progress = ProgressContext::hidden();

    let out = QueryExecutor::new(&mut client, options(25), &progress)
        .execute(&cfg, &plan)
        .unwrap();

    assert_eq!(out.strategy_planned, Strategy::Cursor);
    assert_eq!(out.strategy_used, Strategy::Slicing);
    assert_eq!(out.downloaded, 4);
}

#[test]
fn empty_cursor_with_positive_estimate_falls_back() {
    let cfg = config("use_cursor_preferred: true\nsubscriber_mode: true\nstart_year: 2020\nend_year: 2022\n");
    let plan = ExtractionPlan::new(&cfg, false).unwrap();
    let mut client = sliced_backend(CursorMode::Empty);
    let progress = ProgressContext::hidden();

    let out = QueryExecutor::new(&mut client, options(25), &progress)
        .execute(&cfg, &plan)
        .unwrap();
    assert_eq!(out.strategy_used, Strategy::Slicing);
    assert_eq!(out.years_covered, Some(vec![2020, 2022]));
}

#[test]
fn fallback_without_years_is_configuration_error() {
    let cfg = config("use_cursor_preferred: true\nsubscriber_mode: true\n");
    let plan = ExtractionPlan::new(&cfg, false).unwrap();
    let mut client = sliced_backend(CursorMode::Rejects);
    let progress = ProgressContext::hidden();

    let err = QueryExecutor::new(&mut client, options(25), &progress)
        .execute(&cfg, &plan)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::Configuration { field, .. }) if field == "start_year"
    ));
}

#[test]
fn authentication_failure_is_not_an_empty_result() {
    let cfg = config("start_year: 2020\nend_year: 2020\n");
    let plan = ExtractionPlan::new(&cfg, false).unwrap();
    let mut client = FakeScopus::new(CursorMode::Works);
    client.fail_with = Some(|| anyhow::Error::from(PipelineError::Authentication("HTTP 401".into())));
    let progress = ProgressContext::hidden();

    let err = QueryExecutor::new(&mut client, options(25), &progress)
        .execute(&cfg, &plan)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::Authentication(_))
    ));
}

#[test]
fn rate_limit_surfaces_without_retry() {
    let cfg = config("start_year: 2020\nend_year: 2020\n");
    let plan = ExtractionPlan::new(&cfg, false).unwrap();
    let mut client = FakeScopus::new(CursorMode::Works);
    client.fail_with = Some(|| anyhow::Error::from(PipelineError::RateLimited("HTTP 429".into())));
    let progress = ProgressContext::hidden();

    let err = QueryExecutor::new(&mut client, options(25), &progress)
        .execute(&cfg, &plan)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::RateLimited(_))
    ));
    assert_eq!(client.calls, 1);
}

// ---------------------------------------------------------------------------
// Extract phase
// ---------------------------------------------------------------------------

fn extract_options(base: &Path, yaml: &str, dry_run: bool) -> ExtractOptions {
    let config_path = base.join("config").join("search.yaml");
    std::fs::create_dir_all(config_path.parent().unwrap()).unwrap();
    std::fs::write(&config_path, yaml).unwrap();
    ExtractOptions {
        layout: Layout::new(base),
        run_id: RunId::parse("t1").unwrap(),
        config_path,
        client_config_dir: base.join("config").join("scopus"),
        api_key_file: Some(base.join("config").join("scopus_api_key.txt")),
        inst_token_file: Some(base.join("config").join("inst_token.txt")),
        view: Some(View::Standard),
        force_slicing: false,
        dry_run,
        api_url: "http://127.0.0.1:9/unused".into(),
        page_size: 25,
        requests: RequestSettings::default(),
        write_format: FormatPreference::Csv,
        zstd_level: 3,
        environment: EnvironmentFingerprint::capture("bibline", "test", &[], base),
    }
}

fn env() -> EnvSnapshot {
    EnvSnapshot::from_pairs([("SCOPUS_API_KEY", "super-secret-key"), ("INST_TOKEN", "inst-secret")])
}

#[test]
fn dry_run_writes_manifest_only_and_never_calls_client() {
    let dir = tempfile::tempdir().unwrap();
    let opts = extract_options(
        dir.path(),
        &format!("query: \"{QUERY}\"\nstart_year: 2020\nend_year: 2021\n"),
        true,
    );
    let prepared = runner::prepare(&opts, &env()).unwrap();
    let report = runner::execute(&opts, &prepared, Some(&mut Unreachable), &ProgressContext::hidden())
        .unwrap();

    assert!(report.outcome.dry_run);
    assert_eq!(report.outcome.downloaded, 0);
    assert!(report.raw_output.is_none());
    assert!(!opts.layout.raw_dir().exists());

    let manifest = ManifestWriter::for_layout(&opts.layout)
        .read(ManifestKind::Search, &opts.run_id)
        .unwrap();
    assert_eq!(manifest["dry_run"], true);
    assert_eq!(manifest["strategy_used"], "slicing");
    assert_eq!(manifest["strategy_planned"], "slicing");
    assert_eq!(manifest["n_records_downloaded"], 0);
}

#[test]
fn full_run_writes_table_and_manifest_without_secrets() {
    let dir = tempfile::tempdir().unwrap();
    let opts = extract_options(
        dir.path(),
        &format!("query: \"{QUERY}\"\nnotes: pilot\nstart_year: 2020\nend_year: 2022\n"),
        false,
    );
    let prepared = runner::prepare(&opts, &env()).unwrap();
    let mut client = sliced_backend(CursorMode::Works);
    let report = runner::execute(&opts, &prepared, Some(&mut client), &ProgressContext::hidden())
        .unwrap();

    let written = report.raw_output.unwrap();
    assert_eq!(written.rows, 4);
    assert!(written.path.ends_with("data/raw/scopus_search_t1.csv"));

    let text = std::fs::read_to_string(&report.manifest_path).unwrap();
    assert!(!text.contains("super-secret-key"));
    assert!(!text.contains("inst-secret"));
    let manifest: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(manifest["run_id"], "t1");
    assert_eq!(manifest["query"], QUERY);
    assert_eq!(manifest["notes"], "pilot");
    assert_eq!(manifest["view"], "STANDARD");
    assert_eq!(manifest["years_covered"], serde_json::json!([2020, 2022]));
    assert_eq!(manifest["n_results_estimated"], 4);
    assert_eq!(manifest["raw_output_format"], "csv");
    assert_eq!(manifest["raw_output_hash"].as_str().unwrap().len(), 64);
    assert_eq!(manifest["columns_present"], serde_json::json!(["eid", "title", "coverDate"]));
    assert!(manifest["credential_sources"][0]
        .as_str()
        .unwrap()
        .contains("SCOPUS_API_KEY"));
}

#[test]
fn missing_years_fail_before_any_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let opts = extract_options(dir.path(), &format!("query: \"{QUERY}\"\n"), false);
    let err = runner::prepare(&opts, &env()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::Configuration { .. })
    ));
    assert!(!opts.layout.methods_dir().exists());
    assert!(!opts.layout.raw_dir().exists());
}

#[test]
fn missing_credentials_fail_before_any_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let opts = extract_options(
        dir.path(),
        &format!("query: \"{QUERY}\"\nstart_year: 2020\nend_year: 2020\n"),
        false,
    );
    let err = runner::prepare(&opts, &EnvSnapshot::default()).unwrap_err();
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::Configuration { field, message }) => {
            assert_eq!(field, "api_key");
            assert!(message.contains("SCOPUS_API_KEY"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(!opts.layout.methods_dir().exists());
}

#[test]
fn rerun_overwrites_previous_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = format!("query: \"{QUERY}\"\nstart_year: 2020\nend_year: 2022\n");
    let opts = extract_options(dir.path(), &yaml, false);
    let prepared = runner::prepare(&opts, &env()).unwrap();
    let progress = ProgressContext::hidden();

    let mut client = sliced_backend(CursorMode::Works);
    let first = runner::execute(&opts, &prepared, Some(&mut client), &progress).unwrap();
    let mut client = FakeScopus::new(CursorMode::Works)
        .with(QUERY, vec![rec("e9", "2021-01-01")])
        .with(&year_query(2021), vec![rec("e9", "2021-01-01")]);
    let second = runner::execute(&opts, &prepared, Some(&mut client), &progress).unwrap();

    assert_eq!(first.manifest_path, second.manifest_path);
    assert_eq!(second.raw_output.unwrap().rows, 1);
    let manifest = ManifestWriter::for_layout(&opts.layout)
        .read(ManifestKind::Search, &opts.run_id)
        .unwrap();
    assert_eq!(manifest["n_records_downloaded"], 1);
}
