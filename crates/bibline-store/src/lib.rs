//! bibline-store: run-scoped artifact layout and provenance manifests
//!
//! Every artifact of a pipeline execution lives at a path derived from the
//! run identifier. Manifests record how each phase produced its outputs,
//! with blake3 hashes of the inputs and outputs for auditability.

pub mod fingerprint;
pub mod hash;
pub mod layout;
pub mod manifest;

pub use fingerprint::{EnvironmentFingerprint, git_commit};
pub use hash::{digest_bytes, digest_file};
pub use layout::{Layout, RUN_ID_PREFIX, RunId, run_id_from_table};
pub use manifest::{
    ManifestKind, ManifestWriter, SCHEMA_VERSION, TIMESTAMP_FIELD, is_credential_key,
};
