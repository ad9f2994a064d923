//! Scopus Search API client
//!
//! [`SearchClient`] is the seam the executor talks to; [`ScopusClient`] is
//! the HTTP implementation. Status handling:
//! - 401/403: [`PipelineError::Authentication`], never retried
//! - 429: [`PipelineError::RateLimited`], never retried
//! - 400 on a cursor request: [`ApiError::CursorUnsupported`]
//! - 5xx and transport errors: retried with exponential backoff

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use bibline_core::{PipelineError, Record};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::credentials::Credentials;
use crate::entry::flatten_entry;
use crate::http::{SHARED_RUNTIME, backoff_duration, build_client};

pub const DEFAULT_API_URL: &str = "https://api.elsevier.com/content/search/scopus";

/// Result detail level requested from Scopus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum View {
    #[value(name = "STANDARD")]
    Standard,
    #[value(name = "COMPLETE")]
    Complete,
}

impl View {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Complete => "COMPLETE",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// The service rejected cursor pagination for this key or query.
    #[error("cursor pagination not supported: {0}")]
    CursorUnsupported(String),
    #[error("malformed search response: {0}")]
    MalformedResponse(String),
}

/// One page of a search. Exactly one of `start` / `cursor` is normally set.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub query: &'a str,
    pub view: Option<View>,
    pub count: usize,
    pub start: Option<usize>,
    pub cursor: Option<&'a str>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub total_results: u64,
    pub entries: Vec<Record>,
    pub next_cursor: Option<String>,
}

/// A Scopus-compatible search backend.
pub trait SearchClient {
    /// Total result count for `query` without downloading entries.
    fn count(&mut self, query: &str, view: Option<View>) -> Result<u64>;

    fn page(&mut self, request: &PageRequest<'_>) -> Result<SearchPage>;
}

/// HTTP client for the Scopus Search API.
pub struct ScopusClient {
    api_url: String,
    credentials: Credentials,
    http: reqwest::Client,
    max_retries: u32,
}

impl ScopusClient {
    pub fn new(
        api_url: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self> {
        let http = build_client(timeout).context("failed to build HTTP client")?;
        Ok(Self {
            api_url: api_url.into(),
            credentials,
            http,
            max_retries,
        })
    }

    fn get(&self, params: &[(&str, String)], cursor_request: bool) -> Result<Value> {
        let mut attempt = 0u32;
        loop {
            let result: Result<(u16, String), reqwest::Error> =
                SHARED_RUNTIME.handle().block_on(async {
                    let mut req = self
                        .http
                        .get(&self.api_url)
                        .query(params)
                        .header(reqwest::header::ACCEPT, "application/json")
                        .header("X-ELS-APIKey", self.credentials.api_key.expose());
                    if let Some(token) = &self.credentials.inst_token {
                        req = req.header("X-ELS-Insttoken", token.expose());
                    }
                    let resp = req.send().await?;
                    let status = resp.status().as_u16();
                    let body = resp.text().await?;
                    Ok((status, body))
                });

            let retry_reason = match result {
                Ok((200..=299, body)) => {
                    return serde_json::from_str(&body)
                        .map_err(|e| ApiError::MalformedResponse(e.to_string()).into());
                }
                Ok((status, body)) => {
                    let detail = service_error(&body).unwrap_or_else(|| format!("HTTP {status}"));
                    match status {
                        401 => {
                            return Err(PipelineError::Authentication(format!(
                                "unauthorized ({detail}); check SCOPUS_API_KEY and optional INST_TOKEN entitlement"
                            ))
                            .into());
                        }
                        403 => {
                            return Err(PipelineError::Authentication(format!(
                                "forbidden ({detail}); verify API key entitlement or add INST_TOKEN if required"
                            ))
                            .into());
                        }
                        429 => {
                            return Err(PipelineError::RateLimited(format!(
                                "too many requests ({detail}); reduce request rate or retry later"
                            ))
                            .into());
                        }
                        400 if cursor_request => {
                            return Err(ApiError::CursorUnsupported(detail).into());
                        }
                        500..=599 => format!("HTTP {status}: {detail}"),
                        _ => anyhow::bail!("Scopus request failed: HTTP {status}: {detail}"),
                    }
                }
                // Strip the URL so query strings never reach the logs
                Err(e) => e.without_url().to_string(),
            };

            if attempt >= self.max_retries {
                anyhow::bail!(
                    "Scopus request failed after {} attempts: {retry_reason}",
                    attempt + 1
                );
            }
            attempt += 1;
            let delay = backoff_duration(attempt);
            log::warn!(
                "Scopus request failed ({retry_reason}), retry {attempt}/{} in {delay:?}",
                self.max_retries
            );
            std::thread::sleep(delay);
        }
    }
}

impl SearchClient for ScopusClient {
    fn count(&mut self, query: &str, view: Option<View>) -> Result<u64> {
        let mut params = vec![("query", query.to_string()), ("count", "1".to_string())];
        if let Some(view) = view {
            params.push(("view", view.to_string()));
        }
        let value = self.get(&params, false)?;
        Ok(parse_page(&value)?.total_results)
    }

    fn page(&mut self, request: &PageRequest<'_>) -> Result<SearchPage> {
        let mut params = vec![
            ("query", request.query.to_string()),
            ("count", request.count.to_string()),
        ];
        if let Some(view) = request.view {
            params.push(("view", view.to_string()));
        }
        if let Some(start) = request.start {
            params.push(("start", start.to_string()));
        }
        if let Some(cursor) = request.cursor {
            params.push(("cursor", cursor.to_string()));
        }
        let value = self.get(&params, request.cursor.is_some())?;
        Ok(parse_page(&value)?)
    }
}

/// `service-error.status.statusText` from an error body, if present.
fn service_error(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let status = value.get("service-error")?.get("status")?;
    let text = status.get("statusText").and_then(Value::as_str)?;
    let code = status.get("statusCode").and_then(Value::as_str);
    Some(match code {
        Some(code) => format!("{code}: {text}"),
        None => text.to_string(),
    })
}

/// Parse a `search-results` document.
pub fn parse_page(value: &Value) -> Result<SearchPage, ApiError> {
    let results = value
        .get("search-results")
        .ok_or_else(|| ApiError::MalformedResponse("missing `search-results`".into()))?;

    let total_results = match results.get("opensearch:totalResults") {
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| ApiError::MalformedResponse(format!("bad totalResults {s:?}")))?,
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| ApiError::MalformedResponse(format!("bad totalResults {n}")))?,
        _ => 0,
    };

    let entries = results
        .get("entry")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(flatten_entry).collect())
        .unwrap_or_default();

    let next_cursor = results
        .get("cursor")
        .and_then(|c| c.get("@next"))
        .and_then(Value::as_str)
        .map(String::from);

    Ok(SearchPage {
        total_results,
        entries,
        next_cursor,
    })
}
