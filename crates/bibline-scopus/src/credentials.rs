//! Credential resolution
//!
//! Precedence: explicit key/token files, then the environment, then the
//! client configuration file. Secrets live in newtypes that do not implement
//! `Serialize` and print as `<redacted>`, so they cannot leak into manifests
//! or logs by accident.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bibline_core::PipelineError;

use crate::client_config::ClientConfig;

/// Placeholder shipped in template key files.
pub const PLACEHOLDER_KEY: &str = "YOUR_SCOPUS_API_KEY_HERE";

pub const ENV_API_KEY: &str = "SCOPUS_API_KEY";
pub const ENV_INST_TOKEN: &str = "INST_TOKEN";
/// Deprecated spelling, still honored with a warning.
pub const ENV_INST_TOKEN_LEGACY: &str = "INSTTOKEN";

#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

#[derive(Clone, PartialEq, Eq)]
pub struct InstToken(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl InstToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

impl fmt::Debug for InstToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InstToken(<redacted>)")
    }
}

/// The credential-related environment variables, captured once.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: Vec<(String, String)>,
}

impl EnvSnapshot {
    pub fn capture() -> Self {
        Self::from_pairs(
            [ENV_API_KEY, ENV_INST_TOKEN, ENV_INST_TOKEN_LEGACY]
                .into_iter()
                .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v))),
        )
    }

    pub fn from_pairs<K: Into<String>, V: Into<String>>(
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Non-blank value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Where a credential came from. Recorded in manifests in place of the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    File(PathBuf),
    Environment(&'static str),
    ClientConfig(PathBuf),
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "file {}", path.display()),
            Self::Environment(var) => write!(f, "environment ${var}"),
            Self::ClientConfig(path) => write!(f, "client config {}", path.display()),
        }
    }
}

/// Everything credential resolution looks at.
#[derive(Debug, Clone, Default)]
pub struct CredentialInputs {
    pub api_key_file: Option<PathBuf>,
    pub inst_token_file: Option<PathBuf>,
    pub env: EnvSnapshot,
    pub client_config: Option<ClientConfig>,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: ApiKey,
    pub api_key_source: CredentialSource,
    pub inst_token: Option<InstToken>,
    pub inst_token_source: Option<CredentialSource>,
}

impl Credentials {
    /// Human-readable provenance lines, no secret values.
    pub fn describe_sources(&self) -> Vec<String> {
        let mut out = vec![format!("scopus key: {}", self.api_key_source)];
        if let Some(src) = &self.inst_token_source {
            out.push(format!("institution token: {src}"));
        }
        out
    }
}

/// First non-blank line with `#` comments stripped. A missing file or the
/// template placeholder counts as absent.
pub fn read_key_file(path: &Path) -> Result<Option<String>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };
    Ok(parse_key_text(&text))
}

fn parse_key_text(text: &str) -> Option<String> {
    let line = text
        .lines()
        .map(|l| l.split('#').next().unwrap_or_default().trim())
        .find(|l| !l.is_empty())?;
    (line != PLACEHOLDER_KEY).then(|| line.to_string())
}

/// Resolve credentials from explicit inputs only; never reads the process environment.
pub fn resolve(inputs: &CredentialInputs) -> Result<Credentials> {
    let client_path = inputs.client_config.as_ref().map(|c| c.path().to_path_buf());

    let mut api_key = None;
    if let Some(path) = &inputs.api_key_file {
        if let Some(value) = read_key_file(path)? {
            api_key = Some((value, CredentialSource::File(path.clone())));
        }
    }
    if api_key.is_none() {
        if let Some(value) = inputs.env.get(ENV_API_KEY) {
            api_key = Some((value.to_string(), CredentialSource::Environment(ENV_API_KEY)));
        }
    }
    if api_key.is_none() {
        if let (Some(cfg), Some(path)) = (&inputs.client_config, &client_path) {
            if let Some(value) = cfg.api_key().filter(|v| *v != PLACEHOLDER_KEY) {
                api_key = Some((value.to_string(), CredentialSource::ClientConfig(path.clone())));
            }
        }
    }

    let Some((api_key, api_key_source)) = api_key else {
        let file = inputs
            .api_key_file
            .as_ref()
            .map_or_else(|| "<none>".to_string(), |p| p.display().to_string());
        let cfg = client_path
            .as_ref()
            .map_or_else(|| "<none>".to_string(), |p| p.display().to_string());
        return Err(PipelineError::config(
            "api_key",
            format!(
                "no Scopus API key found; checked key file {file}, environment ${ENV_API_KEY}, client config {cfg}"
            ),
        )
        .into());
    };

    let mut inst_token = None;
    if let Some(path) = &inputs.inst_token_file {
        if let Some(value) = read_key_file(path)? {
            inst_token = Some((value, CredentialSource::File(path.clone())));
        }
    }
    if inst_token.is_none() {
        if let Some(value) = inputs.env.get(ENV_INST_TOKEN) {
            inst_token = Some((value.to_string(), CredentialSource::Environment(ENV_INST_TOKEN)));
        } else if let Some(value) = inputs.env.get(ENV_INST_TOKEN_LEGACY) {
            log::warn!("${ENV_INST_TOKEN_LEGACY} is deprecated; set ${ENV_INST_TOKEN} instead");
            inst_token = Some((
                value.to_string(),
                CredentialSource::Environment(ENV_INST_TOKEN_LEGACY),
            ));
        }
    }
    if inst_token.is_none() {
        if let (Some(cfg), Some(path)) = (&inputs.client_config, &client_path) {
            if let Some(value) = cfg.inst_token() {
                inst_token = Some((value.to_string(), CredentialSource::ClientConfig(path.clone())));
            }
        }
    }

    let (inst_token, inst_token_source) = match inst_token {
        Some((value, source)) => (Some(InstToken(value)), Some(source)),
        None => (None, None),
    };

    log::debug!("Scopus key from {api_key_source}");
    Ok(Credentials {
        api_key: ApiKey(api_key),
        api_key_source,
        inst_token,
        inst_token_source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_config::RequestSettings;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn key_file_parsing() {
        assert_eq!(parse_key_text("# comment\n\n  abc123  # trailing\n"), Some("abc123".into()));
        assert_eq!(parse_key_text("YOUR_SCOPUS_API_KEY_HERE\n"), None);
        assert_eq!(parse_key_text("\n# only comments\n"), None);
        assert_eq!(parse_key_text(""), None);
    }

    #[test]
    fn missing_key_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_key_file(&dir.path().join("nope.txt")).unwrap(), None);
    }

    #[test]
    fn file_beats_environment() {
        let dir = tempfile::tempdir().unwrap();
        let key = write(dir.path(), "key.txt", "from-file\n");
        let inputs = CredentialInputs {
            api_key_file: Some(key.clone()),
            env: EnvSnapshot::from_pairs([(ENV_API_KEY, "from-env")]),
            ..Default::default()
        };
        let creds = resolve(&inputs).unwrap();
        assert_eq!(creds.api_key.expose(), "from-file");
        assert_eq!(creds.api_key_source, CredentialSource::File(key));
    }

    #[test]
    fn placeholder_file_falls_through_to_environment() {
        let dir = tempfile::tempdir().unwrap();
        let key = write(dir.path(), "key.txt", "YOUR_SCOPUS_API_KEY_HERE\n");
        let inputs = CredentialInputs {
            api_key_file: Some(key),
            env: EnvSnapshot::from_pairs([(ENV_API_KEY, " from-env ")]),
            ..Default::default()
        };
        let creds = resolve(&inputs).unwrap();
        assert_eq!(creds.api_key.expose(), "from-env");
        assert_eq!(creds.api_key_source, CredentialSource::Environment(ENV_API_KEY));
    }

    #[test]
    fn client_config_is_last_resort() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ClientConfig::synthesize(
            dir.path(),
            &ApiKey::new("from-cfg"),
            RequestSettings::default(),
            dir.path(),
        )
        .unwrap();
        let inputs = CredentialInputs {
            api_key_file: Some(dir.path().join("missing.txt")),
            client_config: Some(cfg),
            ..Default::default()
        };
        let creds = resolve(&inputs).unwrap();
        assert_eq!(creds.api_key.expose(), "from-cfg");
        assert!(matches!(creds.api_key_source, CredentialSource::ClientConfig(_)));
    }

    #[test]
    fn no_key_names_all_sources() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = CredentialInputs {
            api_key_file: Some(dir.path().join("scopus_api_key.txt")),
            ..Default::default()
        };
        let err = resolve(&inputs).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("scopus_api_key.txt"));
        assert!(msg.contains(ENV_API_KEY));
        assert!(msg.contains("client config"));
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Configuration { .. })
        ));
    }

    #[test]
    fn legacy_token_variable_honored() {
        let inputs = CredentialInputs {
            env: EnvSnapshot::from_pairs([(ENV_API_KEY, "k"), (ENV_INST_TOKEN_LEGACY, "old")]),
            ..Default::default()
        };
        let creds = resolve(&inputs).unwrap();
        assert_eq!(creds.inst_token.unwrap().expose(), "old");
        assert_eq!(
            creds.inst_token_source,
            Some(CredentialSource::Environment(ENV_INST_TOKEN_LEGACY))
        );
    }

    #[test]
    fn new_token_variable_wins_over_legacy() {
        let inputs = CredentialInputs {
            env: EnvSnapshot::from_pairs([
                (ENV_API_KEY, "k"),
                (ENV_INST_TOKEN, "new"),
                (ENV_INST_TOKEN_LEGACY, "old"),
            ]),
            ..Default::default()
        };
        assert_eq!(resolve(&inputs).unwrap().inst_token.unwrap().expose(), "new");
    }

    #[test]
    fn secrets_redacted_in_debug() {
        let creds = Credentials {
            api_key: ApiKey::new("s3cret"),
            api_key_source: CredentialSource::Environment(ENV_API_KEY),
            inst_token: Some(InstToken::new("t0ken")),
            inst_token_source: None,
        };
        let dbg = format!("{creds:?}");
        assert!(!dbg.contains("s3cret"));
        assert!(!dbg.contains("t0ken"));
        assert!(creds.describe_sources().iter().all(|l| !l.contains("s3cret")));
    }
}
