//! Implementation of `fbuild build` and `fbuild plan`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::builder::executor::{BuildExecutor, BuildProgress, InvocationRunner, ProcessRunner};
use crate::builder::metadata::BuildMetadata;
use crate::builder::plan::{BuildPlan, Planner};
use crate::builder::BuildContext;
use crate::core::errors::BuildError;
use crate::core::script::{BuildScript, ScriptArgs, SCRIPT_NAME};
use crate::core::target::BuildMode;
use crate::util::config::{load_config_for, Config};
use crate::util::diagnostic::suggestions;
use crate::util::fs::normalize_lexically;

/// Options for the build and plan commands.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// `Debug` or `Release` (case-insensitive); config default, then `Release`
    pub mode: Option<String>,

    /// Treat every source as stale
    pub rebuild: bool,

    /// Number of parallel compiles
    pub jobs: Option<usize>,

    /// Build script, or a directory containing `FBuild.toml`
    pub script: Option<PathBuf>,

    /// Script arguments as `key=value`
    pub args: Vec<String>,

    /// Specific targets to build (empty = all)
    pub targets: Vec<String>,

    /// Verbose output
    pub verbose: bool,
}

/// A built artifact.
#[derive(Debug)]
pub struct Artifact {
    /// Artifact path
    pub path: PathBuf,

    /// Target name
    pub target: String,
}

/// Build result.
#[derive(Debug, Default)]
pub struct BuildResult {
    /// Targets that were rebuilt
    pub artifacts: Vec<Artifact>,

    /// Targets with nothing to do
    pub up_to_date: Vec<String>,

    /// Targets not attempted because something they link failed
    pub skipped: Vec<String>,

    /// Compiler or linker failures, one per failed target
    pub failures: Vec<BuildError>,
}

impl BuildResult {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Resolve the build mode: command line, then config, then `Release`.
pub fn resolve_mode(cli: Option<&str>, config_default: Option<&str>) -> Result<BuildMode, BuildError> {
    match cli.or(config_default) {
        Some(mode) => mode.parse(),
        None => Ok(BuildMode::default()),
    }
}

/// Parse `key=value` script arguments.
pub fn parse_script_args(mode: BuildMode, rebuild: bool, args: &[String]) -> Result<ScriptArgs, BuildError> {
    let mut script_args = ScriptArgs::new(mode).with_rebuild(rebuild);
    for arg in args {
        let Some((key, value)) = arg.split_once('=') else {
            return Err(BuildError::global_config(format!(
                "invalid script argument `{}`; expected `key=value`",
                arg
            )));
        };
        let key = key.trim();
        if key.is_empty() || key == "build" || key == "rebuild" {
            return Err(BuildError::global_config(format!(
                "invalid script argument `{}`; `{}` cannot be set with --arg",
                arg, key
            )));
        }
        script_args = script_args.with_var(key, value);
    }
    Ok(script_args)
}

/// Find the build script: an explicit file, a directory holding one, or
/// `FBuild.toml` in the current directory.
pub fn locate_script(script: Option<&Path>) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("failed to get current directory")?;
    let candidate = match script {
        Some(path) => cwd.join(path),
        None => cwd.join(SCRIPT_NAME),
    };
    let candidate = if candidate.is_dir() {
        candidate.join(SCRIPT_NAME)
    } else {
        candidate
    };

    if !candidate.is_file() {
        bail!(
            "could not find build script at {}\n{}",
            candidate.display(),
            suggestions::NO_SCRIPT
        );
    }
    Ok(normalize_lexically(&candidate))
}

/// A loaded script plus everything needed to plan and run it.
#[derive(Debug)]
pub struct BuildSession {
    pub script: BuildScript,
    pub ctx: BuildContext,
    pub metadata: BuildMetadata,
    selection: Vec<String>,
}

impl BuildSession {
    /// Load the script, configuration, and metadata named by `opts`.
    ///
    /// The mode is validated before anything else so a bad mode never
    /// touches the filesystem.
    pub fn open(opts: &BuildOptions) -> Result<Self> {
        if let Some(mode) = &opts.mode {
            mode.parse::<BuildMode>()?;
        }

        let script_path = locate_script(opts.script.as_deref())?;
        let script_root = script_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let config = load_config_for(&script_root);

        let mode = resolve_mode(opts.mode.as_deref(), config.build.default_mode.as_deref())?;
        let script_args = parse_script_args(mode, opts.rebuild, &opts.args)?;
        let script = BuildScript::load(&script_path, &script_args)?;

        let ctx = BuildContext::new(&script_root, mode, &config, script.toolchain())?
            .with_jobs(opts.jobs)
            .with_platform(script.platform());
        tracing::debug!("Build context: {:?}", ctx);

        Self::new(script, ctx, opts.targets.clone())
    }

    /// Create a session from an already loaded script and context.
    pub fn new(script: BuildScript, ctx: BuildContext, selection: Vec<String>) -> Result<Self> {
        script.check_selection(&selection)?;

        let metadata = BuildMetadata::load(&ctx.metadata_path());
        Ok(BuildSession {
            script,
            ctx,
            metadata,
            selection,
        })
    }

    /// Plan the selected targets without running anything.
    pub fn plan(&self) -> Result<BuildPlan, BuildError> {
        Planner::new(&self.ctx, &self.metadata).plan(self.script.targets(), &self.selection)
    }

    /// Plan and execute, committing metadata after each successful target.
    ///
    /// Compiler and linker failures are collected in the result; they stop
    /// the failed target and every target linking it, nothing else.
    pub fn run<R: InvocationRunner>(mut self, runner: &R, verbose: bool) -> Result<BuildResult> {
        let plan = self.plan()?;
        let mut result = BuildResult::default();

        if plan.is_up_to_date() {
            result.up_to_date = plan.targets.iter().map(|t| t.name.clone()).collect();
            tracing::info!("All {} target(s) up to date", result.up_to_date.len());
            return Ok(result);
        }

        tracing::info!(
            "Building {} mode: {} compile(s), {} link(s), {} job(s)",
            plan.mode,
            plan.compile_count(),
            plan.link_count(),
            self.ctx.jobs
        );

        let progress = BuildProgress::new(plan.compile_count(), plan.link_count());
        let executor = BuildExecutor::new(runner, self.ctx.jobs, progress)?
            .verbose(verbose)
            .with_progress_bar();
        let metadata_path = self.ctx.metadata_path();
        let mut failed: HashSet<&str> = HashSet::new();

        for target in &plan.targets {
            if !target.stale {
                result.up_to_date.push(target.name.clone());
                continue;
            }

            if let Some(dep) = target.depends_on.iter().find(|d| failed.contains(d.as_str())) {
                tracing::warn!(
                    "Skipping target `{}` because `{}` failed to build",
                    target.name,
                    dep
                );
                failed.insert(&target.name);
                result.skipped.push(target.name.clone());
                continue;
            }

            match executor.execute_target(target) {
                Ok(()) => {
                    let record = target.commit_record()?;
                    self.metadata.commit(&target.name, record);
                    self.metadata.save(&metadata_path)?;
                    result.artifacts.push(Artifact {
                        path: target.output.clone(),
                        target: target.name.clone(),
                    });
                }
                Err(e) if e.is_target_local() => {
                    tracing::debug!("Target `{}` failed: {}", target.name, e);
                    failed.insert(&target.name);
                    result.failures.push(e);
                }
                Err(e) => {
                    executor.finish();
                    return Err(e.into());
                }
            }
        }

        executor.finish();
        Ok(result)
    }
}

/// Build using real compiler processes.
pub fn build(opts: &BuildOptions) -> Result<BuildResult> {
    BuildSession::open(opts)?.run(&ProcessRunner, opts.verbose)
}

/// Compute the plan only.
pub fn plan(opts: &BuildOptions) -> Result<BuildPlan> {
    let session = BuildSession::open(opts)?;
    Ok(session.plan()?)
}

/// Load configuration for the directory a script lives in, without
/// loading the script itself.
pub fn config_for(script: Option<&Path>) -> Result<(PathBuf, Config)> {
    let script_path = locate_script(script)?;
    let root = script_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let config = load_config_for(&root);
    Ok((root, config))
}
