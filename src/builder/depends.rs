//! Header dependency scanning.
//!
//! Finds the headers a source transitively includes by reading `#include`
//! directives. Quoted includes resolve against the including file's
//! directory, then the include directories; angle includes resolve against
//! the include directories, then the including file's directory. Anything
//! that resolves nowhere is a system header and is not tracked.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::util::fs::normalize_lexically;

static INCLUDE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*#[ \t]*include[ \t]*([<"])([^>"\r\n]+)[>"]"#)
        .expect("include pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Quote,
    Angle,
}

/// Transitive `#include` scanner for one target.
#[derive(Debug)]
pub struct IncludeScanner {
    include_dirs: Vec<PathBuf>,
    direct: HashMap<PathBuf, Vec<PathBuf>>,
}

impl IncludeScanner {
    /// `include_dirs` must already be resolved to real directories.
    pub fn new(include_dirs: Vec<PathBuf>) -> Self {
        IncludeScanner {
            include_dirs,
            direct: HashMap::new(),
        }
    }

    /// All headers `source` includes, directly or indirectly, sorted.
    pub fn scan(&mut self, source: &Path) -> Vec<PathBuf> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![source.to_path_buf()];

        while let Some(file) = stack.pop() {
            for header in self.direct_includes(&file) {
                if header != source && seen.insert(header.clone()) {
                    stack.push(header);
                }
            }
        }

        seen.into_iter().collect()
    }

    fn direct_includes(&mut self, file: &Path) -> Vec<PathBuf> {
        if let Some(found) = self.direct.get(file) {
            return found.clone();
        }

        let found = match std::fs::read(file) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                parse_includes(&text)
                    .into_iter()
                    .filter_map(|(delim, name)| self.resolve(file, delim, &name))
                    .collect()
            }
            Err(e) => {
                tracing::debug!("Not scanning {}: {}", file.display(), e);
                Vec::new()
            }
        };

        self.direct.insert(file.to_path_buf(), found.clone());
        found
    }

    fn resolve(&self, includer: &Path, delim: Delimiter, name: &str) -> Option<PathBuf> {
        let own_dir = includer.parent().unwrap_or(Path::new("."));
        let candidates: Box<dyn Iterator<Item = &Path>> = match delim {
            Delimiter::Quote => Box::new(
                std::iter::once(own_dir).chain(self.include_dirs.iter().map(PathBuf::as_path)),
            ),
            Delimiter::Angle => Box::new(
                self.include_dirs
                    .iter()
                    .map(PathBuf::as_path)
                    .chain(std::iter::once(own_dir)),
            ),
        };

        candidates
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
            .map(|found| normalize_lexically(&found))
    }
}

fn parse_includes(text: &str) -> Vec<(Delimiter, String)> {
    INCLUDE_RE
        .captures_iter(text)
        .map(|cap| {
            let delim = if &cap[1] == "<" {
                Delimiter::Angle
            } else {
                Delimiter::Quote
            };
            (delim, cap[2].trim().to_string())
        })
        .collect()
}
