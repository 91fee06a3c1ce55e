//! Staleness checks against recorded build metadata.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::builder::metadata::{FileRecord, TargetRecord};
use crate::util::fs::mtime_nanos;
use crate::util::hash::sha256_file;

/// How a changed file is detected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalenessPolicy {
    /// Content fingerprint only; touching a file does not rebuild it.
    #[default]
    Content,
    /// Content fingerprint or modification time.
    Timestamp,
}

/// Fingerprints files and compares them to stored records.
///
/// Each file is hashed at most once per planning pass, so a header shared
/// by many sources is read once.
#[derive(Debug)]
pub struct StalenessChecker {
    policy: StalenessPolicy,
    fingerprints: HashMap<PathBuf, FileRecord>,
}

impl StalenessChecker {
    pub fn new(policy: StalenessPolicy) -> Self {
        StalenessChecker {
            policy,
            fingerprints: HashMap::new(),
        }
    }

    /// Current fingerprint of a file.
    pub fn fingerprint(&mut self, path: &Path) -> Result<FileRecord> {
        if let Some(record) = self.fingerprints.get(path) {
            return Ok(record.clone());
        }

        let record = FileRecord {
            hash: sha256_file(path)?,
            mtime: mtime_nanos(path),
        };
        self.fingerprints.insert(path.to_path_buf(), record.clone());
        Ok(record)
    }

    /// Whether `current` differs from what `stored` remembers for `path`.
    pub fn differs(&self, path: &Path, current: &FileRecord, stored: Option<&TargetRecord>) -> bool {
        let Some(previous) = stored.and_then(|r| r.file(path)) else {
            return true;
        };

        if previous.hash != current.hash {
            return true;
        }

        self.policy == StalenessPolicy::Timestamp && previous.mtime != current.mtime
    }

    /// Fingerprint `path` and report whether it is stale relative to `stored`.
    pub fn is_stale(&mut self, path: &Path, stored: Option<&TargetRecord>) -> Result<bool> {
        let current = self.fingerprint(path)?;
        Ok(self.differs(path, &current, stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn stored(path: &Path, record: FileRecord) -> TargetRecord {
        let mut files = BTreeMap::new();
        files.insert(path.to_path_buf(), record);
        TargetRecord {
            files,
            ..TargetRecord::default()
        }
    }

    #[test]
    fn test_unknown_file_is_stale() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("main.c");
        std::fs::write(&path, "int main() {}").unwrap();

        let mut checker = StalenessChecker::new(StalenessPolicy::Content);
        assert!(checker.is_stale(&path, None).unwrap());
        assert!(checker.is_stale(&path, Some(&TargetRecord::default())).unwrap());
    }

    #[test]
    fn test_unchanged_file_is_fresh() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("main.c");
        std::fs::write(&path, "int main() {}").unwrap();

        let mut checker = StalenessChecker::new(StalenessPolicy::Content);
        let record = stored(&path, checker.fingerprint(&path).unwrap());
        assert!(!checker.is_stale(&path, Some(&record)).unwrap());
    }

    #[test]
    fn test_changed_content_is_stale() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("main.c");
        std::fs::write(&path, "int main() {}").unwrap();

        let mut checker = StalenessChecker::new(StalenessPolicy::Content);
        let record = stored(&path, checker.fingerprint(&path).unwrap());

        std::fs::write(&path, "int main() { return 1; }").unwrap();
        let mut fresh = StalenessChecker::new(StalenessPolicy::Content);
        assert!(fresh.is_stale(&path, Some(&record)).unwrap());
    }

    #[test]
    fn test_mtime_only_matters_for_timestamp_policy() {
        let path = PathBuf::from("/p/main.c");
        let old = FileRecord {
            hash: "same".to_string(),
            mtime: Some(1),
        };
        let touched = FileRecord {
            hash: "same".to_string(),
            mtime: Some(2),
        };
        let record = stored(&path, old);

        let content = StalenessChecker::new(StalenessPolicy::Content);
        assert!(!content.differs(&path, &touched, Some(&record)));

        let timestamp = StalenessChecker::new(StalenessPolicy::Timestamp);
        assert!(timestamp.differs(&path, &touched, Some(&record)));
    }

    #[test]
    fn test_fingerprint_is_cached() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("common.h");
        std::fs::write(&path, "v1").unwrap();

        let mut checker = StalenessChecker::new(StalenessPolicy::Content);
        let first = checker.fingerprint(&path).unwrap();

        std::fs::write(&path, "v2").unwrap();
        assert_eq!(checker.fingerprint(&path).unwrap(), first);
    }

    #[test]
    fn test_policy_from_config_string() {
        let policy: StalenessPolicy = serde_json::from_str("\"timestamp\"").unwrap();
        assert_eq!(policy, StalenessPolicy::Timestamp);
    }
}
