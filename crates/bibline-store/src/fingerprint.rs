//! Environment fingerprint recorded in every manifest

use std::path::Path;
use std::process::Command;

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EnvironmentFingerprint {
    pub tool: String,
    pub tool_version: String,
    pub os: String,
    pub arch: String,
    /// Optional capabilities compiled into this build.
    pub features: Vec<String>,
    /// `git rev-parse HEAD` of the working directory, when resolvable.
    pub git_commit: Option<String>,
}

impl EnvironmentFingerprint {
    pub fn capture(tool: &str, tool_version: &str, features: &[&str], repo_dir: &Path) -> Self {
        Self {
            tool: tool.to_string(),
            tool_version: tool_version.to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            features: features.iter().map(|f| f.to_string()).collect(),
            git_commit: git_commit(repo_dir),
        }
    }
}

/// Current commit hash of the repository containing `dir`.
pub fn git_commit(dir: &Path) -> Option<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        log::debug!("git rev-parse failed in {}", dir.display());
        return None;
    }
    let commit = String::from_utf8(output.stdout).ok()?.trim().to_string();
    (!commit.is_empty()).then_some(commit)
}
