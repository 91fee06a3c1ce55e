//! Build context - toolchain, mode, and directory layout.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::builder::staleness::StalenessPolicy;
use crate::builder::toolchain::{detect_toolchain, output_file_name, Toolchain};
use crate::core::target::{BuildMode, Platform, TargetDescriptor, ToolchainKind};
use crate::util::config::Config;
use crate::util::fs::normalize_lexically;
use crate::util::process::ProcessBuilder;

/// Directory under the mode directory that holds fbuild's own state.
pub const STATE_DIR: &str = ".fbuild";

/// Build context shared by planning and execution.
#[derive(Clone)]
pub struct BuildContext {
    /// Toolchain implementation
    pub toolchain: Arc<dyn Toolchain>,

    pub mode: BuildMode,

    /// Target architecture chosen by the script, if any
    pub platform: Option<Platform>,

    /// Directory containing the build script
    pub script_root: PathBuf,

    /// `<script root>/../<Mode>`
    pub mode_dir: PathBuf,

    /// Maximum concurrent compiles
    pub jobs: usize,

    pub staleness: StalenessPolicy,

    /// Extra compiler arguments from config and environment
    pub extra_compile_args: Vec<String>,

    /// Extra linker arguments from config
    pub extra_link_args: Vec<String>,
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("toolchain", &self.toolchain.platform())
            .field("mode", &self.mode)
            .field("platform", &self.platform)
            .field("script_root", &self.script_root)
            .field("mode_dir", &self.mode_dir)
            .field("jobs", &self.jobs)
            .field("staleness", &self.staleness)
            .field("extra_compile_args", &self.extra_compile_args)
            .field("extra_link_args", &self.extra_link_args)
            .finish()
    }
}

impl BuildContext {
    /// Create a build context, detecting the toolchain from `config`.
    ///
    /// `kind` restricts detection to the compiler family a script asks for.
    pub fn new(
        script_root: &Path,
        mode: BuildMode,
        config: &Config,
        kind: Option<ToolchainKind>,
    ) -> Result<Self> {
        let toolchain: Arc<dyn Toolchain> = Arc::from(detect_toolchain(&config.toolchain, kind)?);

        let mut ctx = Self::with_toolchain(toolchain, script_root, mode);
        if let Some(jobs) = config.build.jobs {
            ctx.jobs = jobs.max(1);
        }
        ctx.staleness = config.staleness();
        ctx.extra_compile_args = config.toolchain.compile_args_for(mode);
        ctx.extra_link_args = config.toolchain.link_args.clone();
        Ok(ctx)
    }

    /// Create a build context around an explicit toolchain with default settings.
    pub fn with_toolchain(toolchain: Arc<dyn Toolchain>, script_root: &Path, mode: BuildMode) -> Self {
        let script_root = normalize_lexically(script_root);
        let mode_dir = mode_dir(&script_root, mode);

        BuildContext {
            toolchain,
            mode,
            platform: None,
            script_root,
            mode_dir,
            jobs: default_jobs(),
            staleness: StalenessPolicy::default(),
            extra_compile_args: Vec::new(),
            extra_link_args: Vec::new(),
        }
    }

    /// Override the number of parallel jobs.
    pub fn with_jobs(mut self, jobs: Option<usize>) -> Self {
        if let Some(jobs) = jobs {
            self.jobs = jobs.max(1);
        }
        self
    }

    /// Target a specific architecture instead of the compiler default.
    pub fn with_platform(mut self, platform: Option<Platform>) -> Self {
        self.platform = platform;
        self
    }

    /// Get the active toolchain.
    pub fn toolchain(&self) -> &dyn Toolchain {
        self.toolchain.as_ref()
    }

    /// Resolve a script-relative path.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        normalize_lexically(&self.script_root.join(path))
    }

    /// Where build metadata is persisted.
    pub fn metadata_path(&self) -> PathBuf {
        self.mode_dir.join(STATE_DIR).join("metadata.json")
    }

    /// Object directory for a target.
    pub fn obj_dir(&self, target: &TargetDescriptor) -> PathBuf {
        match &target.obj_dir {
            Some(dir) => self.resolve(dir),
            None => self.mode_dir.join("obj").join(&target.name),
        }
    }

    /// Output file for a target.
    pub fn output_path(&self, target: &TargetDescriptor) -> PathBuf {
        match &target.output {
            Some(path) => self.resolve(path),
            None => self.mode_dir.join(output_file_name(
                self.toolchain(),
                &target.name,
                target.kind,
            )),
        }
    }

    /// Compiler version string, if the compiler reports one.
    pub fn compiler_version(&self) -> Option<String> {
        compiler_version(self.toolchain.compiler_path())
    }
}

/// `<script root>/../<Mode>`
pub fn mode_dir(script_root: &Path, mode: BuildMode) -> PathBuf {
    normalize_lexically(&script_root.join("..").join(mode.as_str()))
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Get the compiler version.
fn compiler_version(cc: &Path) -> Option<String> {
    let output = ProcessBuilder::new(cc).arg("--version").exec().ok()?;

    // cl.exe prints its banner on stderr and rejects --version
    let text = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).into_owned()
    } else {
        String::from_utf8_lossy(&output.stdout).into_owned()
    };

    for line in text.lines() {
        for word in line.split_whitespace() {
            if !word.starts_with(|c: char| c.is_ascii_digit()) {
                continue;
            }
            let parts: Vec<&str> = word.split('.').collect();
            if parts.len() >= 2 {
                return Some(format!("{}.{}", parts[0], parts[1]));
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::toolchain::{GccToolchain, ToolchainPlatform};

    fn ctx(root: &str, mode: BuildMode) -> BuildContext {
        let toolchain = Arc::new(GccToolchain::new(
            PathBuf::from("gcc"),
            PathBuf::from("g++"),
            PathBuf::from("ar"),
            ToolchainPlatform::Gcc,
        ));
        BuildContext::with_toolchain(toolchain, Path::new(root), mode)
    }

    #[test]
    fn test_layout_is_sibling_of_script_dir() {
        let ctx = ctx("/work/proj/build", BuildMode::Debug);
        assert_eq!(ctx.mode_dir, PathBuf::from("/work/proj/Debug"));
        assert_eq!(
            ctx.metadata_path(),
            PathBuf::from("/work/proj/Debug/.fbuild/metadata.json")
        );

        let app = TargetDescriptor::executable("app");
        assert_eq!(ctx.obj_dir(&app), PathBuf::from("/work/proj/Debug/obj/app"));
        assert_eq!(ctx.output_path(&app), PathBuf::from("/work/proj/Debug/app"));
    }

    #[test]
    fn test_overrides_resolve_against_script_dir() {
        let ctx = ctx("/work/proj/build", BuildMode::Release);
        let mut lib = TargetDescriptor::static_library("core");
        lib.obj_dir("../tmp/core").output("../Release/core/libcore.a");

        assert_eq!(ctx.obj_dir(&lib), PathBuf::from("/work/proj/tmp/core"));
        assert_eq!(
            ctx.output_path(&lib),
            PathBuf::from("/work/proj/Release/core/libcore.a")
        );
    }

    #[test]
    fn test_jobs_override() {
        let ctx = ctx("/p", BuildMode::Release)
            .with_jobs(Some(0))
            .with_platform(Some(Platform::X64));
        assert_eq!(ctx.jobs, 1);
        let debug = format!("{:?}", ctx);
        assert!(debug.contains("Gcc"));
        assert!(debug.contains("X64"));
    }
}
