//! Target declarations - what gets built.
//!
//! A [`TargetDescriptor`] is filled in through a fluent API and then handed
//! to the planner, which only ever reads it.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::BuildError;

/// The kind of artifact a target produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Executable binary
    #[default]
    Exe,

    /// Static library (.a / .lib)
    StaticLib,

    /// Shared/dynamic library (.so / .dylib / .dll)
    SharedLib,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Exe => "exe",
            TargetKind::StaticLib => "staticlib",
            TargetKind::SharedLib => "sharedlib",
        }
    }

    /// Check if this is a library (static or shared).
    pub fn is_library(&self) -> bool {
        matches!(self, TargetKind::StaticLib | TargetKind::SharedLib)
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exe" | "executable" | "bin" => Ok(TargetKind::Exe),
            "staticlib" | "static" | "lib" => Ok(TargetKind::StaticLib),
            "sharedlib" | "shared" | "dylib" => Ok(TargetKind::SharedLib),
            _ => Err(format!(
                "unknown target kind `{}`; expected `exe`, `staticlib`, or `sharedlib`",
                s
            )),
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build mode. Also names the output directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BuildMode {
    Debug,
    #[default]
    Release,
}

impl BuildMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildMode::Debug => "Debug",
            BuildMode::Release => "Release",
        }
    }

    pub fn is_debug(&self) -> bool {
        *self == BuildMode::Debug
    }
}

impl FromStr for BuildMode {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(BuildMode::Debug),
            "release" => Ok(BuildMode::Release),
            _ => Err(BuildError::global_config(format!(
                "unknown build mode `{}`; expected `Debug` or `Release`",
                s
            ))),
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// C runtime linkage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Crt {
    /// Dynamic CRT (/MD, /MDd) - default
    #[default]
    Dynamic,
    /// Static CRT (/MT, /MTd)
    Static,
}

impl Crt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Crt::Dynamic => "dynamic",
            Crt::Static => "static",
        }
    }

    /// MSVC runtime flag for the given mode.
    pub fn msvc_flag(&self, mode: BuildMode) -> &'static str {
        match (self, mode) {
            (Crt::Dynamic, BuildMode::Release) => "/MD",
            (Crt::Dynamic, BuildMode::Debug) => "/MDd",
            (Crt::Static, BuildMode::Release) => "/MT",
            (Crt::Static, BuildMode::Debug) => "/MTd",
        }
    }
}

impl FromStr for Crt {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dynamic" => Ok(Crt::Dynamic),
            "static" => Ok(Crt::Static),
            _ => Err(format!(
                "unknown CRT linkage `{}`; expected `static` or `dynamic`",
                s
            )),
        }
    }
}

/// Target architecture, selected once per script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    X86,
    X64,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::X86 => "x86",
            Platform::X64 => "x64",
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x86" | "win32" | "i686" => Ok(Platform::X86),
            "x64" | "amd64" | "x86_64" => Ok(Platform::X64),
            _ => Err(format!(
                "unknown platform `{}`; only `x86` and `x64` are supported",
                s
            )),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiler family a script asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolchainKind {
    Gcc,
    Clang,
    Msvc,
}

impl ToolchainKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolchainKind::Gcc => "gcc",
            ToolchainKind::Clang => "clang",
            ToolchainKind::Msvc => "msvc",
        }
    }
}

impl FromStr for ToolchainKind {
    type Err = String;

    /// Versioned MSVC names (`MSVC140`, `msvc-17`) all select MSVC.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "gcc" | "gnu" => Ok(ToolchainKind::Gcc),
            "clang" | "llvm" => Ok(ToolchainKind::Clang),
            _ if lower.starts_with("msvc") => Ok(ToolchainKind::Msvc),
            _ => Err(format!(
                "unknown toolchain `{}`; expected `gcc`, `clang`, or `msvc`",
                s
            )),
        }
    }
}

impl fmt::Display for ToolchainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A precompiled header and the source file that creates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecompiledHeader {
    pub header: PathBuf,
    pub source: PathBuf,
}

/// Highest warning level accepted by [`TargetDescriptor::warning_level`].
pub const MAX_WARNING_LEVEL: u8 = 4;

/// A declared build target.
///
/// Paths are relative to the script directory unless absolute. Every
/// setter returns the descriptor again so calls chain:
///
/// ```
/// use fbuild::core::target::TargetDescriptor;
///
/// let mut exe = TargetDescriptor::executable("app");
/// exe.files(["*.cpp"])
///     .defines(["_CRT_SECURE_NO_WARNINGS"])
///     .warnings_as_errors(true)
///     .crt("static")
///     .unwrap()
///     .output("../Release/app.exe");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetDescriptor {
    pub name: String,
    pub kind: TargetKind,
    pub mode: BuildMode,

    /// Source file patterns (globs or literal paths)
    pub files: Vec<String>,

    /// Preprocessor definitions (`NAME` or `NAME=VALUE`)
    pub defines: Vec<String>,

    /// Include directories
    pub includes: Vec<PathBuf>,

    /// Library dependencies (file names, paths, or bare library names)
    pub libs: Vec<String>,

    /// Library search paths
    pub lib_paths: Vec<PathBuf>,

    pub compile_args: Vec<String>,
    pub link_args: Vec<String>,
    pub crt: Crt,
    pub precompiled_header: Option<PrecompiledHeader>,
    pub warning_level: u8,
    pub warnings_as_errors: bool,
    pub disabled_warnings: Vec<u32>,

    /// When false every source is treated as stale.
    pub dependency_check: bool,

    /// Upper bound on this target's concurrent compiles
    pub threads: Option<usize>,

    /// Command run before the target's first compile
    pub before_compile: Vec<String>,

    /// Object directory override
    pub obj_dir: Option<PathBuf>,

    /// Output file override
    pub output: Option<PathBuf>,
}

impl TargetDescriptor {
    /// Declare a target of the given kind.
    pub fn new(name: impl Into<String>, kind: TargetKind) -> Self {
        TargetDescriptor {
            name: name.into(),
            kind,
            mode: BuildMode::default(),
            files: Vec::new(),
            defines: Vec::new(),
            includes: Vec::new(),
            libs: Vec::new(),
            lib_paths: Vec::new(),
            compile_args: Vec::new(),
            link_args: Vec::new(),
            crt: Crt::default(),
            precompiled_header: None,
            warning_level: 3,
            warnings_as_errors: false,
            disabled_warnings: Vec::new(),
            dependency_check: true,
            threads: None,
            before_compile: Vec::new(),
            obj_dir: None,
            output: None,
        }
    }

    pub fn executable(name: impl Into<String>) -> Self {
        Self::new(name, TargetKind::Exe)
    }

    pub fn static_library(name: impl Into<String>) -> Self {
        Self::new(name, TargetKind::StaticLib)
    }

    pub fn shared_library(name: impl Into<String>) -> Self {
        Self::new(name, TargetKind::SharedLib)
    }

    pub fn build(&mut self, mode: BuildMode) -> &mut Self {
        self.mode = mode;
        self
    }

    pub fn files<I, S>(&mut self, patterns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn defines<I, S>(&mut self, defines: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.defines.extend(defines.into_iter().map(Into::into));
        self
    }

    pub fn includes<I, P>(&mut self, dirs: I) -> &mut Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.includes.extend(dirs.into_iter().map(Into::into));
        self
    }

    pub fn libs<I, S>(&mut self, libs: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.libs.extend(libs.into_iter().map(Into::into));
        self
    }

    pub fn lib_paths<I, P>(&mut self, dirs: I) -> &mut Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.lib_paths.extend(dirs.into_iter().map(Into::into));
        self
    }

    pub fn compile_args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compile_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn link_args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.link_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Select the C runtime linkage (`static` or `dynamic`).
    pub fn crt(&mut self, value: &str) -> Result<&mut Self, BuildError> {
        self.crt = value
            .parse()
            .map_err(|e: String| BuildError::config(&self.name, e))?;
        Ok(self)
    }

    pub fn precompiled_header(
        &mut self,
        header: impl Into<PathBuf>,
        source: impl Into<PathBuf>,
    ) -> &mut Self {
        self.precompiled_header = Some(PrecompiledHeader {
            header: header.into(),
            source: source.into(),
        });
        self
    }

    /// Set the warning level (0 to 4).
    pub fn warning_level(&mut self, level: u8) -> Result<&mut Self, BuildError> {
        if level > MAX_WARNING_LEVEL {
            return Err(BuildError::config(
                &self.name,
                format!(
                    "unknown warning level {}; expected 0 to {}",
                    level, MAX_WARNING_LEVEL
                ),
            ));
        }
        self.warning_level = level;
        Ok(self)
    }

    pub fn warnings_as_errors(&mut self, enabled: bool) -> &mut Self {
        self.warnings_as_errors = enabled;
        self
    }

    pub fn disable_warnings(&mut self, warnings: impl IntoIterator<Item = u32>) -> &mut Self {
        self.disabled_warnings.extend(warnings);
        self
    }

    pub fn dependency_check(&mut self, enabled: bool) -> &mut Self {
        self.dependency_check = enabled;
        self
    }

    /// Limit how many of this target's sources compile at once.
    pub fn threads(&mut self, threads: usize) -> Result<&mut Self, BuildError> {
        if threads == 0 {
            return Err(BuildError::config(&self.name, "threads must be at least 1"));
        }
        self.threads = Some(threads);
        Ok(self)
    }

    /// Run `command` (program followed by its arguments) from the script
    /// directory whenever the target has sources to compile.
    pub fn before_compile<I, S>(&mut self, command: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.before_compile = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn obj_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.obj_dir = Some(dir.into());
        self
    }

    pub fn output(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.output = Some(path.into());
        self
    }

    /// Split `defines` into (name, optional value) pairs.
    pub fn parsed_defines(&self) -> Vec<(String, Option<String>)> {
        self.defines
            .iter()
            .map(|d| match d.split_once('=') {
                Some((name, value)) => (name.to_string(), Some(value.to_string())),
                None => (d.clone(), None),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fluent_chain_accumulates() {
        let mut exe = TargetDescriptor::executable("fbuild");
        exe.build(BuildMode::Debug)
            .files(["*.cpp"])
            .defines(["_CRT_SECURE_NO_WARNINGS"])
            .libs(["Duktape.lib", "Ws2_32.lib"])
            .libs(["Winmm.lib"])
            .link_args(["/SUBSYSTEM:CONSOLE"])
            .warnings_as_errors(true)
            .output("../Debug/FBuild.exe");

        assert_eq!(exe.mode, BuildMode::Debug);
        assert_eq!(exe.files, vec!["*.cpp"]);
        assert_eq!(exe.libs.len(), 3);
        assert!(exe.warnings_as_errors);
        assert_eq!(exe.output, Some(PathBuf::from("../Debug/FBuild.exe")));
    }

    #[test]
    fn test_crt_accepts_known_values() {
        let mut exe = TargetDescriptor::executable("app");
        exe.crt("Static").unwrap();
        assert_eq!(exe.crt, Crt::Static);
        exe.crt("dynamic").unwrap();
        assert_eq!(exe.crt, Crt::Dynamic);
    }

    #[test]
    fn test_crt_rejects_unknown_value() {
        let mut exe = TargetDescriptor::executable("app");
        let err = exe.crt("Hybrid").unwrap_err();

        assert!(matches!(err, BuildError::Configuration { .. }));
        assert!(err.to_string().contains("app"));
        assert!(err.to_string().contains("Hybrid"));
        assert_eq!(exe.crt, Crt::Dynamic);
    }

    #[test]
    fn test_warning_level_range() {
        let mut exe = TargetDescriptor::executable("app");
        assert!(exe.warning_level(4).is_ok());
        assert!(exe.warning_level(5).is_err());
        assert_eq!(exe.warning_level, 4);
    }

    #[test]
    fn test_build_mode_parse() {
        assert_eq!("Debug".parse::<BuildMode>().unwrap(), BuildMode::Debug);
        assert_eq!("release".parse::<BuildMode>().unwrap(), BuildMode::Release);

        let err = "Profile".parse::<BuildMode>().unwrap_err();
        assert!(err.to_string().contains("unknown build mode"));
    }

    #[test]
    fn test_target_kind_parse() {
        assert_eq!("exe".parse::<TargetKind>().unwrap(), TargetKind::Exe);
        assert_eq!("lib".parse::<TargetKind>().unwrap(), TargetKind::StaticLib);
        assert_eq!("shared".parse::<TargetKind>().unwrap(), TargetKind::SharedLib);
        assert!("plugin".parse::<TargetKind>().is_err());
    }

    #[test]
    fn test_parsed_defines() {
        let mut lib = TargetDescriptor::static_library("core");
        lib.defines(["NDEBUG", "VERSION=3"]);

        assert_eq!(
            lib.parsed_defines(),
            vec![
                ("NDEBUG".to_string(), None),
                ("VERSION".to_string(), Some("3".to_string())),
            ]
        );
    }

    #[test]
    fn test_threads_must_be_positive() {
        let mut lib = TargetDescriptor::static_library("core");
        lib.threads(3).unwrap();
        assert_eq!(lib.threads, Some(3));

        let err = lib.threads(0).unwrap_err();
        assert!(matches!(err, BuildError::Configuration { .. }));
        assert_eq!(lib.threads, Some(3));
    }

    #[test]
    fn test_before_compile_replaces_command() {
        let mut exe = TargetDescriptor::executable("app");
        exe.before_compile(["python", "gen.py"])
            .before_compile(["tools/gen", "--out", "src"]);
        assert_eq!(exe.before_compile, vec!["tools/gen", "--out", "src"]);
    }

    #[test]
    fn test_platform_and_toolchain_parse() {
        assert_eq!("x64".parse::<Platform>().unwrap(), Platform::X64);
        assert_eq!("Win32".parse::<Platform>().unwrap(), Platform::X86);
        assert!("arm64".parse::<Platform>().is_err());

        assert_eq!("MSVC140".parse::<ToolchainKind>().unwrap(), ToolchainKind::Msvc);
        assert_eq!("Clang".parse::<ToolchainKind>().unwrap(), ToolchainKind::Clang);
        let err = "icc".parse::<ToolchainKind>().unwrap_err();
        assert!(err.contains("unknown toolchain `icc`"));
    }

    #[test]
    fn test_msvc_crt_flags() {
        assert_eq!(Crt::Static.msvc_flag(BuildMode::Release), "/MT");
        assert_eq!(Crt::Static.msvc_flag(BuildMode::Debug), "/MTd");
        assert_eq!(Crt::Dynamic.msvc_flag(BuildMode::Debug), "/MDd");
    }
}
