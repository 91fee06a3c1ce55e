//! Persistent build metadata for incremental builds.
//!
//! For every target the last successful build recorded the fingerprint of
//! each input file (sources, headers, libraries) plus hashes of the
//! effective compile and link flags. Records are per target, so a header
//! refreshed by one target is still stale for the next.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::util::fs::write_atomic;

/// Bumped when the on-disk layout changes; older files are discarded.
pub const METADATA_VERSION: u32 = 1;

/// Last known state of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// SHA-256 of the contents
    pub hash: String,
    /// Modification time, nanoseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<u64>,
}

/// What one target was last built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub compile_flags: String,
    pub link_flags: String,
    #[serde(default)]
    pub files: BTreeMap<PathBuf, FileRecord>,
}

impl TargetRecord {
    pub fn file(&self, path: &Path) -> Option<&FileRecord> {
        self.files.get(path)
    }
}

/// Build metadata for one mode directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMetadata {
    pub version: u32,
    #[serde(default)]
    pub targets: BTreeMap<String, TargetRecord>,
}

impl Default for BuildMetadata {
    fn default() -> Self {
        BuildMetadata {
            version: METADATA_VERSION,
            targets: BTreeMap::new(),
        }
    }
}

impl BuildMetadata {
    /// Load metadata, starting fresh when the file is missing or unusable.
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!("Ignoring unreadable build metadata {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str::<BuildMetadata>(&contents) {
            Ok(metadata) if metadata.version == METADATA_VERSION => metadata,
            Ok(metadata) => {
                tracing::warn!(
                    "Discarding build metadata version {} (expected {})",
                    metadata.version,
                    METADATA_VERSION
                );
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Discarding corrupt build metadata {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save metadata atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize build metadata")?;
        write_atomic(path, json.as_bytes())
            .with_context(|| format!("failed to write build metadata: {}", path.display()))
    }

    pub fn target(&self, name: &str) -> Option<&TargetRecord> {
        self.targets.get(name)
    }

    /// Replace a target's record after it built successfully.
    pub fn commit(&mut self, name: &str, record: TargetRecord) {
        self.targets.insert(name.to_string(), record);
    }

    pub fn remove(&mut self, name: &str) -> Option<TargetRecord> {
        self.targets.remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(hash: &str) -> TargetRecord {
        let mut record = TargetRecord {
            compile_flags: "c0ffee".to_string(),
            link_flags: "beef".to_string(),
            files: BTreeMap::new(),
        };
        record.files.insert(
            PathBuf::from("/p/main.cpp"),
            FileRecord {
                hash: hash.to_string(),
                mtime: Some(42),
            },
        );
        record
    }

    #[test]
    fn test_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let metadata = BuildMetadata::load(&tmp.path().join("metadata.json"));
        assert!(metadata.targets.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".fbuild").join("metadata.json");

        let mut metadata = BuildMetadata::default();
        metadata.commit("app", record("abc"));
        metadata.save(&path).unwrap();

        let loaded = BuildMetadata::load(&path);
        assert_eq!(loaded, metadata);
        assert_eq!(
            loaded.target("app").unwrap().file(Path::new("/p/main.cpp")).unwrap().hash,
            "abc"
        );
    }

    #[test]
    fn test_commit_replaces_record() {
        let mut metadata = BuildMetadata::default();
        metadata.commit("app", record("old"));
        metadata.commit("app", record("new"));

        assert_eq!(metadata.targets.len(), 1);
        assert_eq!(
            metadata.target("app").unwrap().files.values().next().unwrap().hash,
            "new"
        );
        assert!(metadata.remove("app").is_some());
        assert!(metadata.target("app").is_none());
    }

    #[test]
    fn test_corrupt_file_starts_fresh() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metadata.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(BuildMetadata::load(&path).targets.is_empty());
    }

    #[test]
    fn test_version_mismatch_starts_fresh() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metadata.json");
        std::fs::write(&path, r#"{"version": 999, "targets": {"app": {"compile_flags": "", "link_flags": ""}}}"#).unwrap();

        assert!(BuildMetadata::load(&path).targets.is_empty());
    }
}
