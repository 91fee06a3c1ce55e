//! Test utilities for fbuild unit tests.
//!
//! Provides a recording runner that stands in for the compiler and linker,
//! plus helpers that simulate a successful build without a toolchain.
//!
//! # Example
//!
//! ```rust,ignore
//! use fbuild::test_support::{fixtures::Project, RecordingRunner};
//!
//! #[test]
//! fn test_example() {
//!     let project = Project::cpp_app();
//!     let runner = RecordingRunner::new().fail_on("util.cpp");
//!     // Hand the runner to a BuildExecutor...
//! }
//! ```

pub mod fixtures;

use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;

use crate::builder::executor::{InvocationRunner, RunOutput};
use crate::builder::metadata::BuildMetadata;
use crate::builder::plan::{BuildPlan, Invocation};

/// Runner that records invocations instead of spawning processes.
///
/// Successful invocations write a small placeholder file to their output,
/// so the next plan sees the objects and artifacts as present.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<Invocation>>,
    fail_on: Vec<String>,
}

impl RecordingRunner {
    /// Create a runner where every invocation succeeds.
    pub fn new() -> Self {
        RecordingRunner::default()
    }

    /// Fail any invocation whose subject file name or owning target is `name`.
    pub fn fail_on(mut self, name: &str) -> Self {
        self.fail_on.push(name.to_string());
        self
    }

    /// Invocations seen so far, in the order they ran.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Names of the files produced so far.
    pub fn outputs(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|c| c.output.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect()
    }

    fn should_fail(&self, invocation: &Invocation) -> bool {
        let subject = invocation
            .subject()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.fail_on
            .iter()
            .any(|name| *name == subject || *name == invocation.target)
    }
}

impl InvocationRunner for RecordingRunner {
    fn run(&self, invocation: &Invocation) -> Result<RunOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation.clone());
        }

        if self.should_fail(invocation) {
            return Ok(RunOutput {
                success: false,
                code: Some(1),
                stdout: String::new(),
                stderr: format!("{}: error: simulated failure\n", invocation.subject().display()),
            });
        }

        write_output(&invocation.output)?;
        Ok(RunOutput {
            success: true,
            code: Some(0),
            ..Default::default()
        })
    }
}

fn write_output(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("built {}\n", path.display()))?;
    Ok(())
}

/// Pretend every invocation in `plan` succeeded and commit the results.
pub fn complete(plan: &BuildPlan, metadata: &mut BuildMetadata) {
    for invocation in plan.invocations() {
        write_output(&invocation.output).unwrap();
    }
    for target in plan.targets.iter().filter(|t| t.stale) {
        metadata.commit(&target.name, target.commit_record().unwrap());
    }
}
