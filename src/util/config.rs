//! Configuration file support for fbuild.
//!
//! fbuild reads two configuration files:
//! - Global: `~/.fbuild/config.toml` - User-wide defaults
//! - Project: `.fbuild/config.toml` next to the build script
//!
//! Project config takes precedence over global config, environment
//! variables take precedence over both, and command-line flags win over
//! everything.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::builder::staleness::StalenessPolicy;
use crate::core::target::BuildMode;

/// fbuild configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build settings
    pub build: BuildConfig,

    /// Toolchain overrides
    pub toolchain: ToolchainSettings,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Default number of parallel jobs (None = auto-detect)
    pub jobs: Option<usize>,

    /// How changed files are detected
    pub staleness: Option<StalenessPolicy>,

    /// Build mode used when none is given on the command line
    pub default_mode: Option<String>,
}

/// Toolchain settings for C/C++ compilation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainSettings {
    /// Path to the C compiler (e.g., /usr/bin/clang or cl.exe)
    pub cc: Option<PathBuf>,

    /// Path to the C++ compiler (e.g., /usr/bin/clang++)
    pub cxx: Option<PathBuf>,

    /// Path to the archiver (e.g., /usr/bin/llvm-ar or lib.exe)
    pub ar: Option<PathBuf>,

    /// Path to the linker (MSVC only; GCC-style toolchains link with the driver)
    pub link: Option<PathBuf>,

    /// Extra compiler arguments for every build
    pub compile_args: Vec<String>,

    /// Extra compiler arguments for Debug builds
    pub compile_args_debug: Vec<String>,

    /// Extra compiler arguments for Release builds
    pub compile_args_release: Vec<String>,

    /// Extra linker arguments for every build
    pub link_args: Vec<String>,
}

impl ToolchainSettings {
    /// Check if any compiler paths are configured.
    pub fn has_overrides(&self) -> bool {
        self.cc.is_some() || self.cxx.is_some() || self.ar.is_some() || self.link.is_some()
    }

    /// Extra compiler arguments that apply to `mode`.
    pub fn compile_args_for(&self, mode: BuildMode) -> Vec<String> {
        let per_mode = match mode {
            BuildMode::Debug => &self.compile_args_debug,
            BuildMode::Release => &self.compile_args_release,
        };
        self.compile_args.iter().chain(per_mode).cloned().collect()
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.build.staleness.is_some() {
            self.build.staleness = other.build.staleness;
        }
        if other.build.default_mode.is_some() {
            self.build.default_mode = other.build.default_mode;
        }

        let tc = other.toolchain;
        if tc.cc.is_some() {
            self.toolchain.cc = tc.cc;
        }
        if tc.cxx.is_some() {
            self.toolchain.cxx = tc.cxx;
        }
        if tc.ar.is_some() {
            self.toolchain.ar = tc.ar;
        }
        if tc.link.is_some() {
            self.toolchain.link = tc.link;
        }
        if !tc.compile_args.is_empty() {
            self.toolchain.compile_args = tc.compile_args;
        }
        if !tc.compile_args_debug.is_empty() {
            self.toolchain.compile_args_debug = tc.compile_args_debug;
        }
        if !tc.compile_args_release.is_empty() {
            self.toolchain.compile_args_release = tc.compile_args_release;
        }
        if !tc.link_args.is_empty() {
            self.toolchain.link_args = tc.link_args;
        }
    }

    /// Apply `FBUILD_*` environment overrides.
    ///
    /// `lookup` is `std::env::var` in production; tests pass a map.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(jobs) = lookup("FBUILD_JOBS") {
            match jobs.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.build.jobs = Some(n),
                _ => tracing::warn!("Ignoring invalid FBUILD_JOBS value `{}`", jobs),
            }
        }

        let split = |v: String| v.split_whitespace().map(str::to_string).collect::<Vec<_>>();
        if let Some(args) = lookup("FBUILD_COMPILE_ARGS") {
            self.toolchain.compile_args.extend(split(args));
        }
        if let Some(args) = lookup("FBUILD_COMPILE_ARGS_DEBUG") {
            self.toolchain.compile_args_debug.extend(split(args));
        }
        if let Some(args) = lookup("FBUILD_COMPILE_ARGS_RELEASE") {
            self.toolchain.compile_args_release.extend(split(args));
        }
    }

    /// Staleness policy, defaulting to content fingerprints.
    pub fn staleness(&self) -> StalenessPolicy {
        self.build.staleness.unwrap_or_default()
    }
}

/// Get the global fbuild config directory (~/.fbuild).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".fbuild"))
}

/// Get the global config path (~/.fbuild/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.fbuild/config.toml next to the script).
pub fn project_config_path(script_root: &Path) -> PathBuf {
    script_root.join(".fbuild").join("config.toml")
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.fbuild/config.toml)
/// 2. Global config (~/.fbuild/config.toml)
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global) = global_path.filter(|p| p.exists()) {
        config.merge(Config::load_or_default(global));
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}

/// Load configuration for a script directory, including environment overrides.
pub fn load_config_for(script_root: &Path) -> Config {
    let global = global_config_path();
    let mut config = load_config(global.as_deref(), &project_config_path(script_root));
    config.apply_env(|key| std::env::var(key).ok());
    config
}
