//! Search configuration (YAML) and pagination strategy planning

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bibline_core::PipelineError;
use serde::{Deserialize, Serialize};

fn default_database() -> String {
    "scopus".to_string()
}

/// One bibliographic search. Unknown keys in the file are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub notes: Option<String>,
    /// Try cursor pagination first (only honored in subscriber mode).
    #[serde(default)]
    pub use_cursor_preferred: bool,
    /// The API key belongs to a subscribing institution.
    #[serde(default)]
    pub subscriber_mode: bool,
    #[serde(default)]
    pub start_year: Option<i32>,
    #[serde(default)]
    pub end_year: Option<i32>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            query: String::new(),
            database: default_database(),
            notes: None,
            use_cursor_preferred: false,
            subscriber_mode: false,
            start_year: None,
            end_year: None,
        }
    }
}

/// A validated configuration together with where it came from.
#[derive(Debug, Clone)]
pub struct LoadedSearchConfig {
    pub config: SearchConfig,
    pub path: PathBuf,
    /// blake3 hex digest of the raw file bytes.
    pub hash: String,
}

impl SearchConfig {
    /// Load and validate a YAML search configuration.
    pub fn load(path: &Path) -> Result<LoadedSearchConfig> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PipelineError::config(
                    "config",
                    format!("search configuration {} does not exist", path.display()),
                )
                .into());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        let config = Self::from_yaml(&bytes)?;
        Ok(LoadedSearchConfig {
            config,
            path: path.to_path_buf(),
            hash: bibline_store::digest_bytes(&bytes),
        })
    }

    pub fn from_yaml(bytes: &[u8]) -> Result<Self> {
        // An empty document is an empty mapping, which then fails validation on `query`.
        let config: Self = if bytes.iter().all(u8::is_ascii_whitespace) {
            Self::default()
        } else {
            serde_yaml::from_slice(bytes).map_err(|e| {
                PipelineError::config("config", format!("invalid search YAML: {e}"))
            })?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.query.trim().is_empty() {
            return Err(PipelineError::config("query", "must not be empty"));
        }
        if let (Some(start), Some(end)) = (self.start_year, self.end_year) {
            if start > end {
                return Err(PipelineError::config(
                    "start_year",
                    format!("start_year {start} is after end_year {end}"),
                ));
            }
        }
        Ok(())
    }

    /// Inclusive year range for sliced pagination.
    pub fn year_range(&self) -> Result<(i32, i32), PipelineError> {
        match (self.start_year, self.end_year) {
            (Some(start), Some(end)) => Ok((start, end)),
            (None, _) => Err(PipelineError::config(
                "start_year",
                "required for year-sliced pagination",
            )),
            (_, None) => Err(PipelineError::config(
                "end_year",
                "required for year-sliced pagination",
            )),
        }
    }

    /// Strategy to try first.
    pub fn planned_strategy(&self, force_slicing: bool) -> Strategy {
        if !force_slicing && self.use_cursor_preferred && self.subscriber_mode {
            Strategy::Cursor
        } else {
            Strategy::Slicing
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Cursor,
    Slicing,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cursor => f.write_str("cursor"),
            Self::Slicing => f.write_str("slicing"),
        }
    }
}
