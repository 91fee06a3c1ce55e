//! Hashing utilities for content fingerprints.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Compute SHA256 hash of a file.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// A hasher for building fingerprints from multiple components.
#[derive(Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    /// Create a new fingerprint builder.
    pub fn new() -> Self {
        Fingerprint {
            hasher: Sha256::new(),
        }
    }

    /// Add a string component to the fingerprint.
    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.hasher.update(s.as_bytes());
        self.hasher.update(b"\0"); // Separator
        self
    }

    /// Add multiple strings, prefixed by their count.
    pub fn update_strs<'a>(&mut self, items: impl IntoIterator<Item = &'a str>) -> &mut Self {
        let items: Vec<&str> = items.into_iter().collect();
        self.update_str(&items.len().to_string());
        for s in items {
            self.update_str(s);
        }
        self
    }

    /// Add a path component.
    pub fn update_path(&mut self, path: &Path) -> &mut Self {
        self.update_str(&path.to_string_lossy())
    }

    /// Add an optional string component.
    pub fn update_opt(&mut self, opt: Option<&str>) -> &mut Self {
        match opt {
            Some(s) => {
                self.hasher.update(b"\x01"); // Present marker
                self.update_str(s);
            }
            None => {
                self.hasher.update(b"\x00"); // Absent marker
            }
        }
        self
    }

    /// Add a boolean component.
    pub fn update_bool(&mut self, b: bool) -> &mut Self {
        self.hasher.update([b as u8]);
        self
    }

    /// Finalize and return the fingerprint as a hex string.
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }

    /// Finalize and return a short fingerprint (first 16 chars).
    pub fn finish_short(self) -> String {
        self.finish()[..16].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sha256_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.txt");
        std::fs::write(&path, "hello").unwrap();

        let hash = sha256_file(&path).unwrap();
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_sha256_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = sha256_file(&tmp.path().join("nope.c")).unwrap_err();
        assert!(err.to_string().contains("failed to open file for hashing"));
    }

    #[test]
    fn test_fingerprint() {
        let fp1 = {
            let mut fp = Fingerprint::new();
            fp.update_str("hello").update_str("world");
            fp.finish()
        };

        let fp2 = {
            let mut fp = Fingerprint::new();
            fp.update_str("hello").update_str("world");
            fp.finish()
        };

        let fp3 = {
            let mut fp = Fingerprint::new();
            fp.update_str("hello").update_str("different");
            fp.finish()
        };

        assert_eq!(fp1, fp2);
        assert_ne!(fp1, fp3);
    }

    #[test]
    fn test_fingerprint_list_boundaries() {
        // ["a", "b"] followed by "c" must differ from ["a"] followed by "b", "c"
        let a = {
            let mut fp = Fingerprint::new();
            fp.update_strs(["a", "b"]).update_str("c");
            fp.finish_short()
        };
        let b = {
            let mut fp = Fingerprint::new();
            fp.update_strs(["a"]).update_str("b").update_str("c");
            fp.finish_short()
        };

        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
    }
}
