//! Build executor with progress reporting.
//!
//! Runs one target's invocations: the before-compile command and the
//! precompile (if any), then every compile on a bounded rayon pool, then
//! the link once all compiles have finished.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::builder::plan::{Invocation, InvocationKind, TargetPlan};
use crate::core::errors::BuildError;
use crate::core::target::TargetKind;
use crate::util::fs::{ensure_dir, remove_file_if_exists};

/// Result of running one invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub success: bool,
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    /// Compiler output worth showing to the user.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.trim_end().to_string();
        if !self.stderr.trim().is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(self.stderr.trim_end());
        }
        text
    }
}

/// Something that can run an invocation to completion.
///
/// An `Err` means the program could not be started at all.
pub trait InvocationRunner: Sync {
    fn run(&self, invocation: &Invocation) -> Result<RunOutput>;
}

/// Runs invocations as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl InvocationRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<RunOutput> {
        let output = invocation.to_process().exec()?;
        Ok(RunOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Build executor with progress tracking.
pub struct BuildExecutor<'a, R: InvocationRunner> {
    runner: &'a R,
    pool: rayon::ThreadPool,
    progress: BuildProgress,
    bar: Option<ProgressBar>,
    verbose: bool,
}

impl<'a, R: InvocationRunner> BuildExecutor<'a, R> {
    /// Create an executor running at most `jobs` compiles at once.
    pub fn new(runner: &'a R, jobs: usize, progress: BuildProgress) -> Result<Self> {
        let pool = job_pool(jobs)?;

        Ok(BuildExecutor {
            runner,
            pool,
            progress,
            bar: None,
            verbose: false,
        })
    }

    /// Enable verbose output.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Show a progress bar when there is more than one step.
    pub fn with_progress_bar(mut self) -> Self {
        let total = self.progress.total();
        if !self.verbose && total > 1 {
            let bar = ProgressBar::new(total as u64);
            if let Ok(style) =
                ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            {
                bar.set_style(style.progress_chars("#>-"));
            }
            self.bar = Some(bar);
        }
        self
    }

    /// Run every invocation of a stale target.
    ///
    /// The first failing compile fails the target, but only after all of
    /// its sibling compiles have finished.
    pub fn execute_target(&self, plan: &TargetPlan) -> Result<(), BuildError> {
        self.prepare_dirs(plan)?;

        if let Some(command) = &plan.before_compile {
            self.run_invocation(command)?;
        }

        if let Some(precompile) = &plan.precompile {
            self.run_invocation(precompile)?;
        }

        // A target may allow fewer concurrent compiles than the build
        let limited;
        let pool = if plan.threads < self.pool.current_num_threads() {
            limited = job_pool(plan.threads).map_err(|e| {
                BuildError::config(&plan.name, format!("{:#}", e))
            })?;
            &limited
        } else {
            &self.pool
        };

        let results: Vec<Result<(), BuildError>> = pool.install(|| {
            plan.compiles
                .par_iter()
                .map(|invocation| self.run_invocation(invocation))
                .collect()
        });
        results.into_iter().collect::<Result<(), _>>()?;

        if let Some(link) = &plan.link {
            self.run_invocation(link)?;
        }

        Ok(())
    }

    /// Finish the progress bar.
    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }

    /// Create output directories and delete outputs about to be rebuilt,
    /// so a failed compile never leaves a stale object behind.
    fn prepare_dirs(&self, plan: &TargetPlan) -> Result<(), BuildError> {
        let io = |path: &Path, e: anyhow::Error| BuildError::io(&plan.name, path, format!("{:#}", e));

        ensure_dir(&plan.obj_dir).map_err(|e| io(&plan.obj_dir, e))?;
        if let Some(parent) = plan.output.parent() {
            ensure_dir(parent).map_err(|e| io(parent, e))?;
        }

        for invocation in plan.precompile.iter().chain(&plan.compiles) {
            if let Some(parent) = invocation.output.parent() {
                ensure_dir(parent).map_err(|e| io(parent, e))?;
            }
            remove_file_if_exists(&invocation.output).map_err(|e| io(&invocation.output, e))?;
        }

        // The archiver only adds and replaces members, so objects of
        // removed sources would survive in an existing archive.
        if plan.kind == TargetKind::StaticLib && plan.link.is_some() {
            remove_file_if_exists(&plan.output).map_err(|e| io(&plan.output, e))?;
        }

        Ok(())
    }

    fn run_invocation(&self, invocation: &Invocation) -> Result<(), BuildError> {
        let subject = invocation.subject();
        let label = subject
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match invocation.kind {
            InvocationKind::Compile => tracing::debug!("Compiling {}", subject.display()),
            InvocationKind::Link => tracing::debug!("Linking {}", subject.display()),
            InvocationKind::Command => tracing::debug!(
                "Running before-compile command for `{}`",
                invocation.target
            ),
        }
        if self.verbose {
            eprintln!("     Running `{}`", invocation.display_command());
        }
        if let Some(bar) = &self.bar {
            bar.set_message(label);
        }

        let program = invocation.program.display().to_string();
        let result = match self.runner.run(invocation) {
            Ok(output) if output.success => {
                let text = output.combined();
                if !text.is_empty() {
                    // Warnings from a successful step
                    tracing::info!("{}", text);
                }
                Ok(())
            }
            Ok(output) => Err(BuildError::Process {
                target: invocation.target.clone(),
                file: subject.to_path_buf(),
                program,
                code: output.code,
                output: output.combined(),
            }),
            Err(e) => Err(BuildError::Process {
                target: invocation.target.clone(),
                file: subject.to_path_buf(),
                program,
                code: None,
                output: format!("{:#}", e),
            }),
        };

        let counted = match invocation.kind {
            InvocationKind::Compile => {
                self.progress.compiled();
                true
            }
            InvocationKind::Link => {
                self.progress.linked();
                true
            }
            InvocationKind::Command => false,
        };
        if let (Some(bar), true) = (&self.bar, counted) {
            bar.inc(1);
        }

        result
    }
}

fn job_pool(jobs: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .thread_name(|i| format!("fbuild-job-{}", i))
        .build()
        .context("failed to create build thread pool")
}

/// Progress callback for build steps.
#[derive(Clone)]
pub struct BuildProgress {
    compiled: Arc<AtomicUsize>,
    linked: Arc<AtomicUsize>,
    total_compile: usize,
    total_link: usize,
}

impl BuildProgress {
    /// Create a new progress tracker.
    pub fn new(total_compile: usize, total_link: usize) -> Self {
        BuildProgress {
            compiled: Arc::new(AtomicUsize::new(0)),
            linked: Arc::new(AtomicUsize::new(0)),
            total_compile,
            total_link,
        }
    }

    /// Record a completed compilation.
    pub fn compiled(&self) {
        self.compiled.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a completed link.
    pub fn linked(&self) {
        self.linked.fetch_add(1, Ordering::SeqCst);
    }

    pub fn compile_count(&self) -> usize {
        self.compiled.load(Ordering::SeqCst)
    }

    pub fn link_count(&self) -> usize {
        self.linked.load(Ordering::SeqCst)
    }

    /// Get total expected steps (compile + link).
    pub fn total(&self) -> usize {
        self.total_compile + self.total_link
    }

    /// Check if build is complete.
    pub fn is_complete(&self) -> bool {
        self.compile_count() >= self.total_compile && self.link_count() >= self.total_link
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use crate::builder::metadata::BuildMetadata;
    use crate::builder::plan::Planner;
    use crate::core::target::{BuildMode, TargetDescriptor};
    use crate::test_support::fixtures::Project;
    use crate::test_support::{complete, RecordingRunner};

    fn succeeded() -> RunOutput {
        RunOutput {
            success: true,
            code: Some(0),
            ..Default::default()
        }
    }

    fn plan_one(project: &Project, target: TargetDescriptor) -> TargetPlan {
        let ctx = project.ctx(BuildMode::Debug);
        let metadata = BuildMetadata::default();
        let plan = Planner::new(&ctx, &metadata).plan(&[target], &[]).unwrap();
        plan.targets.into_iter().next().unwrap()
    }

    fn app_plan(project: &Project) -> TargetPlan {
        let mut exe = TargetDescriptor::executable("app");
        exe.files(["src/*.cpp"]).includes(["include"]);
        plan_one(project, exe)
    }

    #[test]
    fn test_build_progress_counts() {
        let progress = BuildProgress::new(2, 1);
        assert_eq!(progress.total(), 3);
        assert!(!progress.is_complete());

        progress.compiled();
        progress.compiled();
        assert!(!progress.is_complete());

        progress.linked();
        assert!(progress.is_complete());
        assert_eq!(progress.compile_count(), 2);
    }

    #[test]
    fn test_build_progress_thread_safe() {
        use std::thread;

        let progress = BuildProgress::new(100, 10);
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let p = progress.clone();
                thread::spawn(move || {
                    for _ in 0..10 {
                        p.compiled();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(progress.compile_count(), 100);
    }

    #[test]
    fn test_link_runs_after_all_compiles() {
        let project = Project::cpp_app();
        let plan = app_plan(&project);
        let runner = RecordingRunner::new();
        let progress = BuildProgress::new(plan.compiles.len(), 1);

        let executor = BuildExecutor::new(&runner, 4, progress.clone()).unwrap();
        executor.execute_target(&plan).unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls.last().unwrap().kind, InvocationKind::Link);
        assert!(progress.is_complete());
        assert!(plan.output.is_file());
    }

    #[test]
    fn test_failed_compile_skips_link_and_names_file() {
        let project = Project::cpp_app();
        let plan = app_plan(&project);
        let runner = RecordingRunner::new().fail_on("util.cpp");

        let executor = BuildExecutor::new(&runner, 2, BuildProgress::new(2, 1)).unwrap();
        let err = executor.execute_target(&plan).unwrap_err();

        match &err {
            BuildError::Process { target, file, code, .. } => {
                assert_eq!(target, "app");
                assert!(file.ends_with("util.cpp"));
                assert_eq!(*code, Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }

        let calls = runner.calls();
        assert_eq!(calls.len(), 2, "both compiles run, link does not");
        assert!(calls.iter().all(|c| c.kind == InvocationKind::Compile));
        assert!(!plan.output.exists());
    }

    #[test]
    fn test_stale_objects_removed_before_compile() {
        let project = Project::cpp_app();
        let plan = app_plan(&project);
        let stale_object = &plan.compiles[0].output;
        std::fs::create_dir_all(stale_object.parent().unwrap()).unwrap();
        std::fs::write(stale_object, "old object").unwrap();

        let runner = RecordingRunner::new().fail_on("main.cpp").fail_on("util.cpp");
        let executor = BuildExecutor::new(&runner, 1, BuildProgress::new(2, 1)).unwrap();
        assert!(executor.execute_target(&plan).is_err());

        assert!(!stale_object.exists());
    }

    #[test]
    fn test_spawn_failure_is_process_error() {
        let project = Project::cpp_app();
        let plan = app_plan(&project);

        struct Unstartable;
        impl InvocationRunner for Unstartable {
            fn run(&self, invocation: &Invocation) -> Result<RunOutput> {
                anyhow::bail!("failed to spawn `{}`", invocation.program.display())
            }
        }

        let executor = BuildExecutor::new(&Unstartable, 1, BuildProgress::new(2, 1)).unwrap();
        let err = executor.execute_target(&plan).unwrap_err();
        assert!(err.is_target_local());
        assert!(err.to_diagnostic().format(false).contains("failed to spawn"));
    }

    #[test]
    fn test_combined_output() {
        let output = RunOutput {
            success: false,
            code: Some(2),
            stdout: "main.cpp\n".to_string(),
            stderr: "main.cpp(3): error C2143\n".to_string(),
        };
        assert_eq!(output.combined(), "main.cpp\nmain.cpp(3): error C2143");
    }

    /// Notes whether the archive was still on disk when the archiver ran.
    #[derive(Default)]
    struct ArchiveWatcher {
        archived_over_existing: AtomicBool,
    }

    impl InvocationRunner for ArchiveWatcher {
        fn run(&self, invocation: &Invocation) -> Result<RunOutput> {
            if invocation.kind == InvocationKind::Link && invocation.output.exists() {
                self.archived_over_existing.store(true, Ordering::SeqCst);
            }
            Ok(succeeded())
        }
    }

    #[test]
    fn test_static_library_is_archived_from_scratch() {
        let project = Project::new();
        project.write("core/a.c", "int a(void) { return 1; }\n");
        project.write("core/b.c", "int b(void) { return 2; }\n");
        let ctx = project.ctx(BuildMode::Release);

        let mut both = TargetDescriptor::static_library("core");
        both.files(["core/a.c", "core/b.c"]);
        let mut metadata = BuildMetadata::default();
        let first = Planner::new(&ctx, &metadata).plan(&[both], &[]).unwrap();
        complete(&first, &mut metadata);

        let mut one = TargetDescriptor::static_library("core");
        one.files(["core/a.c"]);
        let plan = Planner::new(&ctx, &metadata).plan(&[one], &[]).unwrap();
        let target = plan.target("core").unwrap();
        assert!(target.compiles.is_empty());
        assert!(target.output.is_file());

        let archive = target.link.as_ref().unwrap();
        assert!(archive.args.iter().any(|a| a.ends_with("a.o")));
        assert!(!archive.args.iter().any(|a| a.ends_with("b.o")));

        let runner = ArchiveWatcher::default();
        let executor = BuildExecutor::new(&runner, 2, BuildProgress::new(0, 1)).unwrap();
        executor.execute_target(target).unwrap();

        assert!(!runner.archived_over_existing.load(Ordering::SeqCst));
    }

    /// Tracks the highest number of invocations running at once.
    #[derive(Default)]
    struct ConcurrencyGauge {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl InvocationRunner for ConcurrencyGauge {
        fn run(&self, _invocation: &Invocation) -> Result<RunOutput> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(succeeded())
        }
    }

    #[test]
    fn test_target_thread_limit_bounds_compiles() {
        let project = Project::new();
        for name in ["a", "b", "c", "d"] {
            project.write(format!("src/{}.c", name), "int f(void) { return 0; }\n");
        }
        let mut lib = TargetDescriptor::static_library("core");
        lib.files(["src/*.c"]).threads(1).unwrap();
        let plan = plan_one(&project, lib);
        assert_eq!(plan.compiles.len(), 4);

        let gauge = ConcurrencyGauge::default();
        let executor = BuildExecutor::new(&gauge, 4, BuildProgress::new(4, 1)).unwrap();
        executor.execute_target(&plan).unwrap();

        assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_before_compile_runs_first_and_gates_compiles() {
        let project = Project::cpp_app();
        let mut exe = TargetDescriptor::executable("app");
        exe.files(["src/*.cpp"])
            .includes(["include"])
            .before_compile(["tools/gen", "--header"]);
        let plan = plan_one(&project, exe);

        let runner = RecordingRunner::new();
        let progress = BuildProgress::new(2, 1);
        let executor = BuildExecutor::new(&runner, 2, progress.clone()).unwrap();
        executor.execute_target(&plan).unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0].kind, InvocationKind::Command);
        assert!(progress.is_complete());
        assert_eq!(progress.compile_count(), 2);

        let failing = RecordingRunner::new().fail_on("gen");
        let executor = BuildExecutor::new(&failing, 2, BuildProgress::new(2, 1)).unwrap();
        let err = executor.execute_target(&plan).unwrap_err();
        assert!(matches!(err, BuildError::Process { ref file, .. } if file.ends_with("gen")));
        assert_eq!(failing.calls().len(), 1);
    }
}
