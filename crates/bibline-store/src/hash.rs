//! Blake3 digests recorded in manifests

use std::path::Path;

use anyhow::{Context, Result};

/// Hex digest of a file (search config, raw or cleaned table).
pub fn digest_file(path: &Path) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    hasher
        .update_mmap(path)
        .with_context(|| format!("failed to hash {}", path.display()))?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Hex digest of bytes already in memory.
pub fn digest_bytes(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_hex() {
        let d = digest_bytes(b"query: x");
        assert_eq!(d.len(), 64);
        assert_eq!(d, digest_bytes(b"query: x"));
        assert_ne!(d, digest_bytes(b"query: y"));
    }

    #[test]
    fn file_digest_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.yaml");
        std::fs::write(&path, b"query: TITLE(x)").unwrap();
        assert_eq!(digest_file(&path).unwrap(), digest_bytes(b"query: TITLE(x)"));
    }

    #[test]
    fn missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = digest_file(&dir.path().join("missing.csv")).unwrap_err();
        assert!(format!("{err:#}").contains("missing.csv"));
    }
}
