//! Test fixtures for common test scenarios.
//!
//! A [`Project`] is a throwaway source tree inside a temp directory. The
//! script root sits one level down (`<tmp>/project`) so the sibling mode
//! directories (`<tmp>/Debug`, `<tmp>/Release`) stay inside the temp dir.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::builder::context::{mode_dir, BuildContext};
use crate::builder::toolchain::{GccToolchain, MsvcToolchain, ToolchainPlatform};
use crate::core::target::BuildMode;

/// Build script for [`Project::cpp_app`].
pub const CPP_APP_SCRIPT: &str = r#"
[[target]]
name = "app"
files = ["src/*.cpp"]
includes = ["include"]
"#;

/// A source tree on disk.
#[derive(Debug)]
pub struct Project {
    _tmp: TempDir,
    root: PathBuf,
}

impl Project {
    /// Create an empty project.
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("project");
        std::fs::create_dir_all(&root).unwrap();
        Project { _tmp: tmp, root }
    }

    /// Two C++ sources and a header; only `main.cpp` includes the header.
    pub fn cpp_app() -> Self {
        let project = Project::new();
        project.write(
            "src/main.cpp",
            "#include \"app.h\"\n\nint main() { return util(); }\n",
        );
        project.write("src/util.cpp", "int util() { return 0; }\n");
        project.write("include/app.h", "#pragma once\nint util();\n");
        project.write("FBuild.toml", CPP_APP_SCRIPT);
        project
    }

    /// Directory containing the build script.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the build script.
    pub fn script(&self) -> PathBuf {
        self.root.join("FBuild.toml")
    }

    /// Write a file relative to the project root, creating parent directories.
    pub fn write(&self, rel: impl AsRef<Path>, contents: &str) {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    /// A context using a GCC toolchain that is never actually invoked.
    pub fn ctx(&self, mode: BuildMode) -> BuildContext {
        let toolchain = Arc::new(GccToolchain::new(
            PathBuf::from("gcc"),
            PathBuf::from("g++"),
            PathBuf::from("ar"),
            ToolchainPlatform::Gcc,
        ));
        BuildContext::with_toolchain(toolchain, &self.root, mode).with_jobs(Some(2))
    }

    /// Like [`Project::ctx`], with an MSVC toolchain.
    pub fn msvc_ctx(&self, mode: BuildMode) -> BuildContext {
        let toolchain = Arc::new(MsvcToolchain::new(
            PathBuf::from("cl.exe"),
            PathBuf::from("lib.exe"),
            PathBuf::from("link.exe"),
        ));
        BuildContext::with_toolchain(toolchain, &self.root, mode).with_jobs(Some(2))
    }

    /// `<tmp>/<Mode>`
    pub fn mode_dir(&self, mode: BuildMode) -> PathBuf {
        mode_dir(&self.root, mode)
    }
}

impl Default for Project {
    fn default() -> Self {
        Project::new()
    }
}
