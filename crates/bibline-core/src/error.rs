//! Pipeline error taxonomy
//!
//! Phases propagate everything through `anyhow`; the variants here are the
//! failures a caller must be able to tell apart (the CLI maps them to exit
//! codes via `downcast_ref`).

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Optional capability that may be missing from a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Columnar (Parquet) table files.
    ColumnarFormat,
    /// PNG chart rendering.
    Charting,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ColumnarFormat => f.write_str("columnar table format"),
            Self::Charting => f.write_str("chart rendering"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or contradictory configuration. Fatal before any artifact is written.
    #[error("configuration error in `{field}`: {message}")]
    Configuration { field: String, message: String },

    /// Invalid or insufficiently privileged credentials (HTTP 401/403).
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// HTTP 429. Never retried here; the operator decides when to re-run.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Degraded mode. Logged by the phases, never returned by them.
    #[error("{capability} unavailable: {reason}")]
    CapabilityUnavailable {
        capability: Capability,
        reason: String,
    },

    /// An upstream manifest required for verification is absent.
    #[error("manifest not found: {}", path.display())]
    ManifestNotFound { path: PathBuf },
}

impl PipelineError {
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this failure kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration { .. } => 2,
            Self::Authentication(_) => 3,
            Self::RateLimited(_) => 4,
            Self::ManifestNotFound { .. } => 5,
            Self::CapabilityUnavailable { .. } => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_names_field() {
        let err = PipelineError::config("start_year", "required when slicing");
        let msg = err.to_string();
        assert!(msg.contains("start_year"));
        assert!(msg.contains("required when slicing"));
    }

    #[test]
    fn exit_codes_distinct() {
        let codes = [
            PipelineError::config("query", "empty").exit_code(),
            PipelineError::Authentication("401".into()).exit_code(),
            PipelineError::RateLimited("429".into()).exit_code(),
            PipelineError::ManifestNotFound {
                path: PathBuf::from("x.json"),
            }
            .exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
            assert_ne!(*a, 0);
        }
    }

    #[test]
    fn manifest_not_found_shows_path() {
        let err = PipelineError::ManifestNotFound {
            path: PathBuf::from("outputs/methods/search_manifest_r1.json"),
        };
        assert!(err.to_string().contains("search_manifest_r1.json"));
    }

    #[test]
    fn downcast_through_anyhow() {
        let err: anyhow::Error = PipelineError::RateLimited("slow down".into()).into();
        let err = err.context("extract failed");
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::RateLimited(_))
        ));
    }
}
