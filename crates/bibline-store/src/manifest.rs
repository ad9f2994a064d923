//! Phase manifests: one JSON provenance record per phase and run
//!
//! Bodies are any `Serialize` value; the writer adds the common envelope
//! (kind, run id, schema version, timestamp), strips credential-shaped keys
//! and writes pretty JSON with sorted keys, so two writes of the same body
//! differ only in `timestamp_utc`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bibline_core::PipelineError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::layout::{Layout, RunId};

/// Manifest format version.
pub const SCHEMA_VERSION: &str = "1.0";

/// The only field that differs between two writes of the same body.
pub const TIMESTAMP_FIELD: &str = "timestamp_utc";

/// Key fragments that mark a field as a credential.
const CREDENTIAL_KEYS: &[&str] = &[
    "api_key",
    "apikey",
    "token",
    "inst_token",
    "secret",
    "password",
    "authorization",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestKind {
    Search,
    Cleaning,
    Analysis,
}

impl ManifestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Cleaning => "cleaning",
            Self::Analysis => "analysis",
        }
    }
}

impl fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a JSON key names a credential (case and separator insensitive).
pub fn is_credential_key(key: &str) -> bool {
    let norm: String = key
        .chars()
        .map(|c| match c {
            '-' | ' ' | '.' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect();
    CREDENTIAL_KEYS.iter().any(|k| {
        norm == *k || norm.ends_with(&format!("_{k}")) || norm.starts_with(&format!("{k}_"))
    })
}

/// Remove credential-shaped keys at any depth. Returns the removed key paths.
fn strip_credentials(value: &mut Value, path: &str, removed: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            let doomed: Vec<String> = map.keys().filter(|k| is_credential_key(k)).cloned().collect();
            for key in doomed {
                map.remove(&key);
                removed.push(format!("{path}{key}"));
            }
            for (key, child) in map.iter_mut() {
                strip_credentials(child, &format!("{path}{key}."), removed);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter_mut().enumerate() {
                strip_credentials(child, &format!("{path}{i}."), removed);
            }
        }
        _ => {}
    }
}

/// Rebuild every object with keys in sorted order.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted.into_iter().collect::<Map<String, Value>>())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Writes and reads manifests under `outputs/methods/`.
#[derive(Debug, Clone)]
pub struct ManifestWriter {
    dir: PathBuf,
}

impl ManifestWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn for_layout(layout: &Layout) -> Self {
        Self::new(layout.methods_dir())
    }

    /// `<dir>/<kind>_manifest_<run>.json`
    pub fn path(&self, kind: ManifestKind, run: &RunId) -> PathBuf {
        self.dir.join(format!("{kind}_manifest_{run}.json"))
    }

    /// Render the manifest document without writing it.
    pub fn render<T: Serialize>(
        &self,
        kind: ManifestKind,
        run: &RunId,
        body: &T,
        timestamp: chrono::DateTime<chrono::Utc>,
    ) -> Result<String> {
        let mut value = serde_json::to_value(body).context("failed to serialize manifest")?;
        let Value::Object(map) = &mut value else {
            anyhow::bail!("manifest body must serialize to a JSON object");
        };
        map.insert("manifest_kind".into(), Value::from(kind.as_str()));
        map.insert("run_id".into(), Value::from(run.as_str()));
        map.insert("schema_version".into(), Value::from(SCHEMA_VERSION));
        map.insert(
            TIMESTAMP_FIELD.into(),
            Value::from(timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        );

        let mut removed = Vec::new();
        strip_credentials(&mut value, "", &mut removed);
        for key in &removed {
            log::warn!("Dropped credential-like field `{key}` from {kind} manifest");
        }

        let mut json =
            serde_json::to_string_pretty(&sort_keys(value)).context("failed to format manifest")?;
        json.push('\n');
        Ok(json)
    }

    /// Write (or overwrite) the manifest for `kind` and `run`.
    pub fn write<T: Serialize>(&self, kind: ManifestKind, run: &RunId, body: &T) -> Result<PathBuf> {
        let json = self.render(kind, run, body, chrono::Utc::now())?;
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let path = self.path(kind, run);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("failed to rename {} to {}", tmp.display(), path.display()))?;
        log::info!("Wrote {kind} manifest {}", path.display());
        Ok(path)
    }

    /// Path of an existing manifest, or [`PipelineError::ManifestNotFound`].
    pub fn require(&self, kind: ManifestKind, run: &RunId) -> Result<PathBuf> {
        let path = self.path(kind, run);
        if !path.is_file() {
            return Err(PipelineError::ManifestNotFound { path }.into());
        }
        Ok(path)
    }

    pub fn read(&self, kind: ManifestKind, run: &RunId) -> Result<Value> {
        self.read_as(kind, run)
    }

    pub fn read_as<T: DeserializeOwned>(&self, kind: ManifestKind, run: &RunId) -> Result<T> {
        let path = self.require(kind, run)?;
        read_json(&path)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Body {
        query: String,
        downloaded: usize,
        nested: BTreeMap<String, String>,
    }

    fn body() -> Body {
        let mut nested = BTreeMap::new();
        nested.insert("view".into(), "STANDARD".into());
        nested.insert("inst_token".into(), "t0k".into());
        Body {
            query: "TITLE(x)".into(),
            downloaded: 3,
            nested,
        }
    }

    fn run() -> RunId {
        RunId::parse("r1").unwrap()
    }

    #[test]
    fn credential_keys() {
        for key in ["api_key", "APIKey", "inst_token", "X-ELS-APIKey", "scopus_api_key", "password"] {
            assert!(is_credential_key(key), "{key}");
        }
        for key in ["query", "config_hash", "tokenizer_version", "notes"] {
            assert!(!is_credential_key(key), "{key}");
        }
    }

    #[test]
    fn envelope_and_sorted_keys() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ManifestWriter::new(dir.path());
        let path = writer.write(ManifestKind::Search, &run(), &body()).unwrap();
        assert!(path.ends_with("search_manifest_r1.json"));

        let text = std::fs::read_to_string(&path).unwrap();
        let keys: Vec<&str> = text
            .lines()
            .filter(|l| l.starts_with("  \""))
            .map(|l| l.trim().split('"').nth(1).unwrap())
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);

        let value = writer.read(ManifestKind::Search, &run()).unwrap();
        assert_eq!(value["run_id"], "r1");
        assert_eq!(value["manifest_kind"], "search");
        assert_eq!(value["schema_version"], SCHEMA_VERSION);
        assert_eq!(value["downloaded"], 3);
    }

    #[test]
    fn credentials_stripped_recursively() {
        let writer = ManifestWriter::new("unused");
        let json = writer
            .render(ManifestKind::Search, &run(), &body(), chrono::Utc::now())
            .unwrap();
        assert!(!json.contains("inst_token"));
        assert!(!json.contains("t0k"));
        assert!(json.contains("STANDARD"));
    }

    #[test]
    fn identical_except_timestamp() {
        let writer = ManifestWriter::new("unused");
        let t1 = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let t2 = chrono::DateTime::from_timestamp(1_700_000_999, 0).unwrap();
        let a = writer.render(ManifestKind::Cleaning, &run(), &body(), t1).unwrap();
        let b = writer.render(ManifestKind::Cleaning, &run(), &body(), t2).unwrap();
        assert_ne!(a, b);
        let strip = |s: &str| -> Vec<String> {
            s.lines()
                .filter(|l| !l.contains(TIMESTAMP_FIELD))
                .map(String::from)
                .collect()
        };
        assert_eq!(strip(&a), strip(&b));
        assert_eq!(a, writer.render(ManifestKind::Cleaning, &run(), &body(), t1).unwrap());
    }

    #[test]
    fn missing_manifest_is_typed() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ManifestWriter::new(dir.path());
        let err = writer.read(ManifestKind::Cleaning, &run()).unwrap_err();
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::ManifestNotFound { path }) => {
                assert!(path.ends_with("cleaning_manifest_r1.json"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_object_body_rejected() {
        let writer = ManifestWriter::new("unused");
        assert!(writer
            .render(ManifestKind::Analysis, &run(), &vec![1, 2], chrono::Utc::now())
            .is_err());
    }
}
