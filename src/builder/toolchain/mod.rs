//! Toolchain abstraction for C/C++ compilers.
//!
//! This module provides a unified interface for generating compiler/linker
//! commands across different toolchains (GCC, Clang, MSVC).
//!
//! Toolchain detection priority:
//! 1. `[toolchain]` section of `.fbuild/config.toml` or `~/.fbuild/config.toml`
//! 2. Environment variables (CC, CXX, AR)
//! 3. Auto-detection (searching PATH for common compilers)

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::target::{BuildMode, Crt, Platform, TargetKind};

mod detect;
mod gcc;
mod msvc;

pub use detect::detect_toolchain;
pub use gcc::GccToolchain;
pub use msvc::MsvcToolchain;

/// Source language, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    C,
    Cxx,
}

impl Language {
    /// `.c` is C; everything else (`.cpp`, `.cc`, `.cxx`, ...) is C++.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("c") => Language::C,
            _ => Language::Cxx,
        }
    }

    /// The driver that links objects from all of `sources`.
    pub fn link_driver<'a>(sources: impl IntoIterator<Item = &'a Path>) -> Self {
        if sources
            .into_iter()
            .any(|s| Language::from_path(s) == Language::Cxx)
        {
            Language::Cxx
        } else {
            Language::C
        }
    }
}

/// Per-target code generation options.
#[derive(Debug, Clone)]
pub struct CodegenOptions {
    pub mode: BuildMode,
    pub crt: Crt,
    /// 0 (off) to 4 (pedantic)
    pub warning_level: u8,
    pub warnings_as_errors: bool,
    /// Numbered warnings to silence (MSVC only)
    pub disabled_warnings: Vec<u32>,
    /// Emit position-independent code (shared libraries)
    pub position_independent: bool,
    /// Target architecture; the compiler default when unset
    pub platform: Option<Platform>,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions {
            mode: BuildMode::default(),
            crt: Crt::default(),
            warning_level: 3,
            warnings_as_errors: false,
            disabled_warnings: Vec::new(),
            position_independent: false,
            platform: None,
        }
    }
}

/// Whether a compile creates or consumes the precompiled header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PchRole {
    Create,
    Use,
}

/// Precompiled header settings for one compile.
#[derive(Debug, Clone)]
pub struct PchUsage {
    /// Header as written in the sources
    pub header: PathBuf,
    /// Header on disk
    pub header_file: PathBuf,
    /// Compiled header file
    pub artifact: PathBuf,
    pub role: PchRole,
}

/// A command to execute, with program, arguments, and environment.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// The program to run (e.g., "gcc", "cl.exe")
    pub program: PathBuf,
    /// Command arguments
    pub args: Vec<String>,
    /// Environment variables to set
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Create a new command spec.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Input for a compile step.
#[derive(Debug, Clone)]
pub struct CompileInput {
    /// Source file to compile
    pub source: PathBuf,
    /// Output object file
    pub output: PathBuf,
    /// Include directories
    pub include_dirs: Vec<PathBuf>,
    /// Preprocessor defines (name, optional value)
    pub defines: Vec<(String, Option<String>)>,
    /// Additional compiler flags
    pub cflags: Vec<String>,
    pub pch: Option<PchUsage>,
}

/// Input for an archive step (creating static library).
#[derive(Debug, Clone)]
pub struct ArchiveInput {
    /// Object files to archive
    pub objects: Vec<PathBuf>,
    /// Output archive file
    pub output: PathBuf,
}

/// Input for a link step.
#[derive(Debug, Clone)]
pub struct LinkInput {
    /// Object files to link
    pub objects: Vec<PathBuf>,
    /// Output file (executable or shared library)
    pub output: PathBuf,
    /// Library search paths
    pub lib_dirs: Vec<PathBuf>,
    /// Library files passed by path
    pub lib_files: Vec<PathBuf>,
    /// System libraries passed by name
    pub libs: Vec<String>,
    /// Additional linker flags
    pub ldflags: Vec<String>,
}

/// The platform/family of a toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolchainPlatform {
    /// GCC (GNU Compiler Collection)
    Gcc,
    /// Clang/LLVM
    Clang,
    /// Apple Clang (macOS)
    AppleClang,
    /// Microsoft Visual C++
    Msvc,
}

impl ToolchainPlatform {
    /// Get the platform name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolchainPlatform::Gcc => "gcc",
            ToolchainPlatform::Clang => "clang",
            ToolchainPlatform::AppleClang => "apple-clang",
            ToolchainPlatform::Msvc => "msvc",
        }
    }
}

/// Trait for toolchain implementations.
///
/// Each toolchain knows how to generate commands for its specific compiler.
pub trait Toolchain: Send + Sync {
    /// Get the toolchain platform.
    fn platform(&self) -> ToolchainPlatform;

    /// Get the C compiler path.
    fn compiler_path(&self) -> &Path;

    /// Get the C++ compiler path.
    fn cxx_compiler_path(&self) -> &Path;

    /// Get the archiver path.
    fn archiver_path(&self) -> &Path;

    /// Get the linker path (the compiler driver for GCC-style toolchains).
    fn linker_path(&self) -> &Path;

    /// Generate a compile command.
    fn compile_command(
        &self,
        input: &CompileInput,
        lang: Language,
        opts: &CodegenOptions,
    ) -> CommandSpec;

    /// Generate an archive command (create static library).
    fn archive_command(&self, input: &ArchiveInput) -> CommandSpec;

    /// Generate a link command for shared library.
    fn link_shared_command(
        &self,
        input: &LinkInput,
        driver: Language,
        opts: &CodegenOptions,
    ) -> CommandSpec;

    /// Generate a link command for executable.
    fn link_exe_command(
        &self,
        input: &LinkInput,
        driver: Language,
        opts: &CodegenOptions,
    ) -> CommandSpec;

    /// The file other targets link against to use the shared library
    /// written to `output`.
    fn import_library(&self, output: &Path) -> PathBuf {
        output.to_path_buf()
    }

    /// File name of the compiled precompiled header inside the object directory.
    fn pch_file_name(&self, header: &Path) -> String;

    /// Get the object file extension.
    fn object_extension(&self) -> &str;

    /// Get the static library extension.
    fn static_lib_extension(&self) -> &str;

    /// Get the shared library extension.
    fn shared_lib_extension(&self) -> &str;

    /// Get the executable extension.
    fn exe_extension(&self) -> &str;

    /// Get the static library prefix (e.g., "lib" on Unix).
    fn static_lib_prefix(&self) -> &str;

    /// Get the shared library prefix.
    fn shared_lib_prefix(&self) -> &str;
}

/// Default output file name for a target built with `toolchain`.
pub fn output_file_name(
    toolchain: &dyn Toolchain,
    name: &str,
    kind: TargetKind,
) -> String {
    let (prefix, ext) = match kind {
        TargetKind::Exe => ("", toolchain.exe_extension()),
        TargetKind::StaticLib => (
            toolchain.static_lib_prefix(),
            toolchain.static_lib_extension(),
        ),
        TargetKind::SharedLib => (
            toolchain.shared_lib_prefix(),
            toolchain.shared_lib_extension(),
        ),
    };

    if ext.is_empty() {
        format!("{}{}", prefix, name)
    } else {
        format!("{}{}.{}", prefix, name, ext)
    }
}
