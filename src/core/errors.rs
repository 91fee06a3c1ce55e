//! Build error types and diagnostics.

use std::path::{Path, PathBuf};

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// Errors raised while declaring, planning, or running a build.
///
/// `Configuration` and `Io` abort the whole build before any invocation
/// runs. `Process` only fails the target that owns the invocation.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum BuildError {
    #[error("{}{message}", scope(.target))]
    #[diagnostic(code(fbuild::configuration))]
    Configuration {
        target: Option<String>,
        message: String,
    },

    #[error("target `{target}`: {message}: {}", .path.display())]
    #[diagnostic(code(fbuild::io))]
    Io {
        target: String,
        path: PathBuf,
        message: String,
    },

    #[error("target `{target}`: `{program}` failed for {} ({})", .file.display(), exit_code(.code))]
    #[diagnostic(
        code(fbuild::process),
        help("Run `fbuild build --verbose` to see the full command line")
    )]
    Process {
        target: String,
        file: PathBuf,
        program: String,
        code: Option<i32>,
        output: String,
    },
}

fn scope(target: &Option<String>) -> String {
    match target {
        Some(name) => format!("target `{}`: ", name),
        None => String::new(),
    }
}

fn exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code".to_string(),
    }
}

impl BuildError {
    /// A configuration error that belongs to a specific target.
    pub fn config(target: impl Into<String>, message: impl Into<String>) -> Self {
        BuildError::Configuration {
            target: Some(target.into()),
            message: message.into(),
        }
    }

    /// A configuration error not tied to any target (e.g. the build mode).
    pub fn global_config(message: impl Into<String>) -> Self {
        BuildError::Configuration {
            target: None,
            message: message.into(),
        }
    }

    /// A missing or unreadable input file.
    pub fn io(target: impl Into<String>, path: &Path, message: impl Into<String>) -> Self {
        BuildError::Io {
            target: target.into(),
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Whether this error only affects its own target.
    pub fn is_target_local(&self) -> bool {
        matches!(self, BuildError::Process { .. })
    }

    /// The target this error names, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            BuildError::Configuration { target, .. } => target.as_deref(),
            BuildError::Io { target, .. } | BuildError::Process { target, .. } => Some(target),
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            BuildError::Configuration { .. } => Diagnostic::error(self.to_string())
                .with_suggestion("Check the target declarations in FBuild.toml"),

            BuildError::Io { path, .. } => Diagnostic::error(self.to_string())
                .with_location(path)
                .with_suggestion("Check that the file exists and the glob patterns are correct"),

            BuildError::Process { file, output, .. } => {
                let mut diag = Diagnostic::error(self.to_string()).with_location(file);
                for line in output.lines().filter(|l| !l.trim().is_empty()).take(20) {
                    diag = diag.with_context(line);
                }
                diag.with_suggestion(suggestions::BUILD_FAILED)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_message_names_target() {
        let err = BuildError::config("app", "unknown CRT linkage `shared`");
        assert_eq!(
            err.to_string(),
            "target `app`: unknown CRT linkage `shared`"
        );
        assert_eq!(err.target(), Some("app"));
        assert!(!err.is_target_local());
    }

    #[test]
    fn test_global_configuration_message() {
        let err = BuildError::global_config("unknown build mode `Fast`");
        assert_eq!(err.to_string(), "unknown build mode `Fast`");
        assert_eq!(err.target(), None);
    }

    #[test]
    fn test_io_message_names_target_and_file() {
        let err = BuildError::io("app", Path::new("src/missing.cpp"), "source file not found");
        let msg = err.to_string();
        assert!(msg.contains("app"));
        assert!(msg.contains("src/missing.cpp"));
    }

    #[test]
    fn test_process_diagnostic_includes_output() {
        let err = BuildError::Process {
            target: "app".to_string(),
            file: PathBuf::from("main.cpp"),
            program: "g++".to_string(),
            code: Some(1),
            output: "main.cpp:3: error: expected ';'\n".to_string(),
        };

        assert!(err.is_target_local());
        assert!(err.to_string().contains("exit code 1"));

        let output = err.to_diagnostic().format(false);
        assert!(output.contains("expected ';'"));
        assert!(output.contains("--> main.cpp"));
    }
}
