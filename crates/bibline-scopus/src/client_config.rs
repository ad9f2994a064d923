//! Scopus client configuration (`scopus-client.toml`)
//!
//! Holds the client's own settings: authentication fallback, cache
//! directory and request behavior. When no file exists and an API key is
//! resolvable, one is synthesized with repo-local cache paths.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::credentials::ApiKey;

pub const CLIENT_CONFIG_FILE: &str = "scopus-client.toml";

/// Request behavior written into a synthesized client config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_max_retries() -> u32 {
    5
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
struct Authentication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inst_token: Option<String>,
}

impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authentication")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("inst_token", &self.inst_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Directories {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ClientConfigFile {
    #[serde(default)]
    authentication: Authentication,
    #[serde(default)]
    directories: Directories,
    #[serde(default)]
    requests: RequestSettings,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    path: PathBuf,
    file: ClientConfigFile,
}

impl ClientConfig {
    /// `<dir>/scopus-client.toml`
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(CLIENT_CONFIG_FILE)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file: ClientConfigFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Load the client config in `dir` if one exists.
    pub fn load_optional(dir: &Path) -> Result<Option<Self>> {
        let path = Self::path_in(dir);
        if !path.is_file() {
            return Ok(None);
        }
        Self::load(&path).map(Some)
    }

    /// Write a fresh client config into `dir` with the cache under
    /// `<base_dir>/.cache/scopus`.
    pub fn synthesize(
        dir: &Path,
        api_key: &ApiKey,
        requests: RequestSettings,
        base_dir: &Path,
    ) -> Result<Self> {
        let cache_dir = base_dir.join(".cache").join("scopus");
        std::fs::create_dir_all(cache_dir.join("scopus_search"))
            .with_context(|| format!("failed to create {}", cache_dir.display()))?;
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

        let file = ClientConfigFile {
            authentication: Authentication {
                api_key: Some(api_key.expose().to_string()),
                inst_token: None,
            },
            directories: Directories {
                cache_dir: Some(cache_dir),
            },
            requests,
        };
        let path = Self::path_in(dir);
        let text = toml::to_string_pretty(&file).context("failed to serialize client config")?;
        std::fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;
        log::info!("Created client config {}", path.display());
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn api_key(&self) -> Option<&str> {
        non_blank(self.file.authentication.api_key.as_deref())
    }

    pub fn inst_token(&self) -> Option<&str> {
        non_blank(self.file.authentication.inst_token.as_deref())
    }

    pub fn cache_dir(&self) -> Option<&Path> {
        self.file.directories.cache_dir.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.file.requests.timeout_secs)
    }

    pub fn max_retries(&self) -> u32 {
        self.file.requests.max_retries
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesize_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_dir = dir.path().join("config").join("scopus");
        let written = ClientConfig::synthesize(
            &cfg_dir,
            &ApiKey::new("k-123"),
            RequestSettings {
                timeout_secs: 7,
                max_retries: 2,
            },
            dir.path(),
        )
        .unwrap();
        assert!(dir.path().join(".cache/scopus/scopus_search").is_dir());

        let loaded = ClientConfig::load_optional(&cfg_dir).unwrap().unwrap();
        assert_eq!(loaded.path(), written.path());
        assert_eq!(loaded.api_key(), Some("k-123"));
        assert_eq!(loaded.inst_token(), None);
        assert_eq!(loaded.timeout(), Duration::from_secs(7));
        assert_eq!(loaded.max_retries(), 2);
        assert_eq!(loaded.cache_dir(), Some(dir.path().join(".cache/scopus").as_path()));
    }

    #[test]
    fn missing_sections_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CLIENT_CONFIG_FILE);
        std::fs::write(&path, "[authentication]\napi_key = \"  \"\n").unwrap();
        let cfg = ClientConfig::load(&path).unwrap();
        assert_eq!(cfg.api_key(), None);
        assert_eq!(cfg.max_retries(), 5);
        assert_eq!(cfg.timeout(), Duration::from_secs(20));
    }

    #[test]
    fn absent_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ClientConfig::load_optional(dir.path()).unwrap().is_none());
    }

    #[test]
    fn debug_redacts_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ClientConfig::synthesize(
            dir.path(),
            &ApiKey::new("very-secret"),
            RequestSettings::default(),
            dir.path(),
        )
        .unwrap();
        assert!(!format!("{cfg:?}").contains("very-secret"));
    }
}
