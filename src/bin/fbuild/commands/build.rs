//! `fbuild build` command

use anyhow::{bail, Result};

use crate::cli::BuildArgs;
use fbuild::ops::build;
use fbuild::util::diagnostic::{emit, Diagnostic};
use fbuild::util::fs::relative_path;

pub fn execute(args: BuildArgs, verbose: bool, color: bool) -> Result<()> {
    let opts = args.script.into_options(args.jobs, verbose);
    let result = build(&opts)?;
    let cwd = std::env::current_dir()?;

    for artifact in &result.artifacts {
        eprintln!(
            "    Finished `{}` -> {}",
            artifact.target,
            relative_path(&cwd, &artifact.path).display()
        );
    }
    if result.artifacts.is_empty() && result.is_success() {
        eprintln!("    Finished all targets up to date");
    }

    for failure in &result.failures {
        emit(&failure.to_diagnostic(), color);
    }
    for skipped in &result.skipped {
        let diag = Diagnostic::warning(format!("target `{}` was not built", skipped))
            .with_context("a library it links failed to build");
        emit(&diag, color);
    }

    if !result.is_success() {
        bail!(
            "build failed: {} target(s) failed, {} skipped",
            result.failures.len(),
            result.skipped.len()
        );
    }

    Ok(())
}
