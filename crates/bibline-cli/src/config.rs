//! Application settings loaded from TOML files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bibline_core::PipelineError;
use bibline_scopus::{RequestSettings, api::DEFAULT_API_URL, executor::DEFAULT_PAGE_SIZE};
use serde::Deserialize;

/// Global settings for bibline
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub paths: PathsConfig,
    pub output: OutputConfig,
    pub scopus: ScopusConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PathsConfig {
    /// Project root all artifacts live under (default: current directory)
    #[serde(deserialize_with = "deserialize_env_var")]
    pub base_dir: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub prefer_parquet: bool,
    pub zstd_level: i32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            prefer_parquet: true,
            zstd_level: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScopusConfig {
    #[serde(deserialize_with = "deserialize_env_var")]
    pub api_url: Option<String>,
    pub page_size: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for ScopusConfig {
    fn default() -> Self {
        let requests = RequestSettings::default();
        Self {
            api_url: None,
            page_size: DEFAULT_PAGE_SIZE,
            timeout_secs: requests.timeout_secs,
            max_retries: requests.max_retries,
        }
    }
}

impl ScopusConfig {
    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    pub fn requests(&self) -> RequestSettings {
        RequestSettings {
            timeout_secs: self.timeout_secs,
            max_retries: self.max_retries,
        }
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Settings {
    /// Load settings from an explicit path or the default locations
    ///
    /// Search order:
    /// 1. `--settings <path>`
    /// 2. ./bibline.toml (current directory)
    /// 3. ~/.config/bibline/config.toml
    ///
    /// If no settings file is found, returns defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(PipelineError::config(
                    "settings",
                    format!("settings file not found: {}", path.display()),
                )
                .into());
            }
            return Self::from_file(path);
        }

        let local = PathBuf::from("bibline.toml");
        if local.exists() {
            return Self::from_file(&local);
        }

        if let Some(dirs) = directories::ProjectDirs::from("", "", "bibline") {
            let user = dirs.config_dir().join("config.toml");
            if user.exists() {
                return Self::from_file(&user);
            }
        }

        log::debug!("No settings file found, using defaults");
        Ok(Self::default())
    }

    /// Load settings from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&content).map_err(|e| {
            PipelineError::config("settings", format!("{}: {e}", path.display()))
        })?;
        settings.validate()?;

        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(1..=200).contains(&self.scopus.page_size) {
            return Err(PipelineError::config(
                "scopus.page_size",
                format!("must be between 1 and 200, got {}", self.scopus.page_size),
            ));
        }
        if !(1..=22).contains(&self.output.zstd_level) {
            return Err(PipelineError::config(
                "output.zstd_level",
                format!("must be between 1 and 22, got {}", self.output.zstd_level),
            ));
        }
        if self.scopus.timeout_secs == 0 {
            return Err(PipelineError::config("scopus.timeout_secs", "must be positive"));
        }
        Ok(())
    }

    /// `--base-dir` beats the settings file, which beats the current directory.
    pub fn base_dir(&self, cli: Option<&Path>) -> PathBuf {
        cli.map(Path::to_path_buf)
            .or_else(|| self.paths.base_dir.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
