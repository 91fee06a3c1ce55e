//! Build scripts (`FBuild.toml`).
//!
//! A script is a list of `[[target]]` tables. Each table is applied to a
//! [`TargetDescriptor`] through the same fluent API a Rust caller would use,
//! so option validation happens in exactly one place.
//!
//! String values may contain `{name}` placeholders that are replaced with
//! script arguments. `{build}` always expands to the build mode. The
//! optional top-level `toolchain` and `platform` keys apply to every target:
//!
//! ```toml
//! toolchain = "msvc"
//! platform = "x64"
//!
//! [[target]]
//! name = "app"
//! files = ["*.cpp"]
//! crt = "static"
//! output = "../{build}/app.exe"
//! lib-paths = ["../{build}"]
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::errors::BuildError;
use crate::core::target::{BuildMode, Platform, TargetDescriptor, TargetKind, ToolchainKind};
use crate::util::fs::normalize_lexically;

/// Default script file name.
pub const SCRIPT_NAME: &str = "FBuild.toml";

/// Arguments a script is evaluated with.
#[derive(Debug, Clone, Default)]
pub struct ScriptArgs {
    pub mode: BuildMode,

    /// Treat every source as stale, ignoring per-target settings
    pub rebuild: bool,

    /// Extra `{key}` substitutions
    pub vars: BTreeMap<String, String>,
}

impl ScriptArgs {
    pub fn new(mode: BuildMode) -> Self {
        ScriptArgs {
            mode,
            ..Default::default()
        }
    }

    pub fn with_rebuild(mut self, rebuild: bool) -> Self {
        self.rebuild = rebuild;
        self
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    fn lookup(&self, key: &str) -> Option<String> {
        match key {
            "build" => Some(self.mode.as_str().to_string()),
            "rebuild" => Some(self.rebuild.to_string()),
            _ => self.vars.get(key).cloned(),
        }
    }

    /// Replace `{key}` placeholders in `value`.
    pub fn expand(&self, target: &str, value: &str) -> Result<String, BuildError> {
        let mut out = String::with_capacity(value.len());
        let mut rest = value;

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];

            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                return Ok(out);
            };

            let key = &after[..end];
            let is_ident = !key.is_empty()
                && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

            if !is_ident {
                out.push('{');
                rest = after;
                continue;
            }

            match self.lookup(key) {
                Some(v) => out.push_str(&v),
                None => {
                    return Err(BuildError::config(
                        target,
                        format!("unknown script argument `{{{}}}` in `{}`", key, value),
                    ))
                }
            }
            rest = &after[end + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

/// Either a single whitespace-separated string or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ArgList {
    One(String),
    Many(Vec<String>),
}

impl Default for ArgList {
    fn default() -> Self {
        ArgList::Many(Vec::new())
    }
}

impl ArgList {
    fn into_vec(self) -> Vec<String> {
        match self {
            ArgList::One(s) => s.split_whitespace().map(str::to_string).collect(),
            ArgList::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawScript {
    #[serde(default)]
    toolchain: Option<String>,
    #[serde(default)]
    platform: Option<String>,
    #[serde(default, rename = "target")]
    targets: Vec<RawTarget>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct RawTarget {
    name: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    files: Vec<String>,
    #[serde(default)]
    defines: Vec<String>,
    #[serde(default)]
    includes: Vec<String>,
    #[serde(default)]
    libs: Vec<String>,
    #[serde(default)]
    lib_paths: Vec<String>,
    #[serde(default)]
    compile_args: ArgList,
    #[serde(default)]
    link_args: ArgList,
    #[serde(default)]
    crt: Option<String>,
    #[serde(default)]
    precompiled_header: Option<RawPrecompiledHeader>,
    #[serde(default)]
    warning_level: Option<u8>,
    #[serde(default)]
    warnings_as_errors: Option<bool>,
    #[serde(default)]
    disable_warnings: Vec<u32>,
    #[serde(default)]
    dependency_check: Option<bool>,
    #[serde(default)]
    threads: Option<usize>,
    #[serde(default)]
    before_compile: ArgList,
    #[serde(default)]
    obj_dir: Option<String>,
    #[serde(default)]
    output: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPrecompiledHeader {
    header: String,
    source: String,
}

/// A loaded build script: its directory and the targets it declares.
#[derive(Debug, Clone)]
pub struct BuildScript {
    root: PathBuf,
    toolchain: Option<ToolchainKind>,
    platform: Option<Platform>,
    targets: Vec<TargetDescriptor>,
}

impl BuildScript {
    /// Create an empty script rooted at `root` (the directory that relative
    /// paths resolve against).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        BuildScript {
            root: root.into(),
            toolchain: None,
            platform: None,
            targets: Vec::new(),
        }
    }

    /// Load and evaluate a script file.
    pub fn load(path: &Path, args: &ScriptArgs) -> Result<Self, BuildError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BuildError::io("<script>", path, format!("cannot read build script ({})", e)))?;

        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Self::parse(&contents, root, args).map_err(|e| match e {
            BuildError::Configuration { target: None, message } => BuildError::global_config(
                format!("{}: {}", path.display(), message),
            ),
            other => other,
        })
    }

    /// Evaluate script source text.
    pub fn parse(contents: &str, root: PathBuf, args: &ScriptArgs) -> Result<Self, BuildError> {
        let raw: RawScript = toml::from_str(contents)
            .map_err(|e| BuildError::global_config(format!("invalid build script: {}", e)))?;

        let mut script = BuildScript::new(root);
        if let Some(ref toolchain) = raw.toolchain {
            script.set_toolchain(&args.expand("<script>", toolchain)?)?;
        }
        if let Some(ref platform) = raw.platform {
            script.set_platform(&args.expand("<script>", platform)?)?;
        }
        for raw_target in raw.targets {
            let target = declare(raw_target, args)?;
            script.add(target)?;
        }

        tracing::debug!("Declared {} target(s)", script.targets.len());
        Ok(script)
    }

    /// Register a target, enforcing unique names and outputs.
    pub fn add(&mut self, target: TargetDescriptor) -> Result<(), BuildError> {
        if self.targets.iter().any(|t| t.name == target.name) {
            return Err(BuildError::config(
                &target.name,
                "a target with this name is already declared",
            ));
        }

        if let Some(ref output) = target.output {
            let resolved = normalize_lexically(&self.root.join(output));
            let clash = self.targets.iter().find(|t| {
                t.output
                    .as_ref()
                    .map(|o| normalize_lexically(&self.root.join(o)) == resolved)
                    .unwrap_or(false)
            });
            if let Some(other) = clash {
                return Err(BuildError::config(
                    &target.name,
                    format!(
                        "output {} is already written by target `{}`",
                        output.display(),
                        other.name
                    ),
                ));
            }
        }

        self.targets.push(target);
        Ok(())
    }

    /// Require a compiler family (`gcc`, `clang`, `msvc`).
    pub fn set_toolchain(&mut self, value: &str) -> Result<&mut Self, BuildError> {
        self.toolchain = Some(value.parse().map_err(BuildError::global_config)?);
        Ok(self)
    }

    /// Select the target architecture (`x86` or `x64`).
    pub fn set_platform(&mut self, value: &str) -> Result<&mut Self, BuildError> {
        self.platform = Some(value.parse().map_err(BuildError::global_config)?);
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn toolchain(&self) -> Option<ToolchainKind> {
        self.toolchain
    }

    pub fn platform(&self) -> Option<Platform> {
        self.platform
    }

    pub fn targets(&self) -> &[TargetDescriptor] {
        &self.targets
    }

    pub fn target(&self, name: &str) -> Option<&TargetDescriptor> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Names of all declared targets, in declaration order.
    pub fn target_names(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.name.as_str()).collect()
    }

    /// Check that every selected target is declared.
    pub fn check_selection(&self, names: &[String]) -> Result<(), BuildError> {
        let known: HashSet<&str> = self.targets.iter().map(|t| t.name.as_str()).collect();
        for name in names {
            if !known.contains(name.as_str()) {
                return Err(BuildError::global_config(format!(
                    "unknown target `{}`; available targets: {}",
                    name,
                    self.target_names().join(", ")
                )));
            }
        }
        Ok(())
    }
}

fn declare(raw: RawTarget, args: &ScriptArgs) -> Result<TargetDescriptor, BuildError> {
    let name = raw.name;
    let expand = |v: &str| args.expand(&name, v);
    let expand_all = |vs: Vec<String>| -> Result<Vec<String>, BuildError> {
        vs.iter().map(|v| args.expand(&name, v)).collect()
    };

    let kind = match raw.kind {
        Some(ref k) => k
            .parse::<TargetKind>()
            .map_err(|e| BuildError::config(&name, e))?,
        None => TargetKind::Exe,
    };

    let mut target = TargetDescriptor::new(name.clone(), kind);
    target
        .build(args.mode)
        .files(expand_all(raw.files)?)
        .defines(expand_all(raw.defines)?)
        .includes(expand_all(raw.includes)?)
        .libs(expand_all(raw.libs)?)
        .lib_paths(expand_all(raw.lib_paths)?)
        .compile_args(expand_all(raw.compile_args.into_vec())?)
        .link_args(expand_all(raw.link_args.into_vec())?)
        .disable_warnings(raw.disable_warnings)
        .dependency_check(raw.dependency_check.unwrap_or(true) && !args.rebuild);

    let hook = expand_all(raw.before_compile.into_vec())?;
    if !hook.is_empty() {
        target.before_compile(hook);
    }
    if let Some(threads) = raw.threads {
        target.threads(threads)?;
    }
    if let Some(ref crt) = raw.crt {
        target.crt(crt)?;
    }
    if let Some(level) = raw.warning_level {
        target.warning_level(level)?;
    }
    if let Some(werror) = raw.warnings_as_errors {
        target.warnings_as_errors(werror);
    }
    if let Some(pch) = raw.precompiled_header {
        target.precompiled_header(expand(&pch.header)?, expand(&pch.source)?);
    }
    if let Some(ref dir) = raw.obj_dir {
        target.obj_dir(expand(dir)?);
    }
    if let Some(ref output) = raw.output {
        target.output(expand(output)?);
    }

    Ok(target)
}
