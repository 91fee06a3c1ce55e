//! Build plan generation.
//!
//! A [`BuildPlan`] lists, per target and in dependency order, the compiler
//! and linker invocations needed to bring the target up to date. Targets
//! with nothing stale contribute no invocations.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::DfsPostOrder;
use serde::Serialize;

use crate::builder::context::BuildContext;
use crate::builder::depends::IncludeScanner;
use crate::builder::metadata::{BuildMetadata, FileRecord, TargetRecord};
use crate::builder::staleness::StalenessChecker;
use crate::builder::toolchain::{
    ArchiveInput, CodegenOptions, CommandSpec, CompileInput, Language, LinkInput, PchRole,
    PchUsage,
};
use crate::core::errors::BuildError;
use crate::core::target::{BuildMode, TargetDescriptor, TargetKind};
use crate::util::fs::{
    glob_files, is_glob_pattern, is_nonempty_file, mtime_nanos, normalize_lexically,
};
use crate::util::hash::{sha256_file, Fingerprint};
use crate::util::process::ProcessBuilder;

/// Whether an invocation compiles one source, links a target, or runs
/// the target's before-compile command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationKind {
    Compile,
    /// Link or archive
    Link,
    Command,
}

/// A single compiler or linker command.
#[derive(Debug, Clone, Serialize)]
pub struct Invocation {
    pub kind: InvocationKind,
    /// Owning target
    pub target: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    pub inputs: Vec<PathBuf>,
    /// Empty for commands that declare no output
    #[serde(skip_serializing_if = "is_empty_path")]
    pub output: PathBuf,
}

#[allow(clippy::ptr_arg)]
fn is_empty_path(path: &PathBuf) -> bool {
    path.as_os_str().is_empty()
}

impl Invocation {
    fn new(
        kind: InvocationKind,
        target: &str,
        cmd: CommandSpec,
        inputs: Vec<PathBuf>,
        output: PathBuf,
    ) -> Self {
        Invocation {
            kind,
            target: target.to_string(),
            program: cmd.program,
            args: cmd.args,
            env: cmd.env,
            cwd: None,
            inputs,
            output,
        }
    }

    /// The file errors are reported against: the source for a compile,
    /// the output for a link, the program for a command.
    pub fn subject(&self) -> &Path {
        match self.kind {
            InvocationKind::Compile => self
                .inputs
                .first()
                .map_or(self.output.as_path(), PathBuf::as_path),
            InvocationKind::Link => self.output.as_path(),
            InvocationKind::Command => self.program.as_path(),
        }
    }

    pub fn to_process(&self) -> ProcessBuilder {
        let mut process = ProcessBuilder::new(&self.program).args(&self.args);
        for (key, value) in &self.env {
            process = process.env(key, value);
        }
        if let Some(cwd) = &self.cwd {
            process = process.cwd(cwd);
        }
        process
    }

    pub fn display_command(&self) -> String {
        self.to_process().display_command()
    }
}

/// The planned work for one target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetPlan {
    pub name: String,
    pub kind: TargetKind,
    pub output: PathBuf,
    pub obj_dir: PathBuf,
    pub stale: bool,

    /// Concurrent compiles allowed for this target
    pub threads: usize,

    /// Object file of every source, compiled this run or not
    pub objects: Vec<PathBuf>,

    /// Targets whose outputs this target links
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Script command run before any compile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_compile: Option<Invocation>,

    /// Compile of the precompiled-header source, run before `compiles`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precompile: Option<Invocation>,

    pub compiles: Vec<Invocation>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<Invocation>,

    /// Source and header fingerprints taken while planning
    #[serde(skip)]
    pub record: TargetRecord,

    /// Library files fingerprinted only once the target has linked
    #[serde(skip)]
    pub tracked_libs: Vec<PathBuf>,
}

impl TargetPlan {
    /// All invocations in execution order.
    pub fn invocations(&self) -> impl Iterator<Item = &Invocation> {
        self.before_compile
            .iter()
            .chain(self.precompile.iter())
            .chain(self.compiles.iter())
            .chain(self.link.iter())
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations().count()
    }

    /// Objects this run recompiles.
    pub fn compiled_objects(&self) -> impl Iterator<Item = &Path> {
        self.precompile
            .iter()
            .chain(self.compiles.iter())
            .map(|i| i.output.as_path())
    }

    /// The record to persist after this target built successfully.
    pub fn commit_record(&self) -> Result<TargetRecord> {
        let mut record = self.record.clone();
        for lib in &self.tracked_libs {
            let hash = sha256_file(lib)
                .with_context(|| format!("failed to fingerprint library {}", lib.display()))?;
            record.files.insert(
                lib.clone(),
                FileRecord {
                    hash,
                    mtime: mtime_nanos(lib),
                },
            );
        }
        Ok(record)
    }
}

/// A complete build plan.
#[derive(Debug, Clone, Serialize)]
pub struct BuildPlan {
    pub mode: BuildMode,
    /// Targets in build order (producers before the targets linking them)
    pub targets: Vec<TargetPlan>,
}

impl BuildPlan {
    pub fn invocations(&self) -> impl Iterator<Item = &Invocation> {
        self.targets.iter().flat_map(TargetPlan::invocations)
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations().count()
    }

    /// Number of compile invocations (precompiles included).
    pub fn compile_count(&self) -> usize {
        self.invocations()
            .filter(|i| i.kind == InvocationKind::Compile)
            .count()
    }

    pub fn link_count(&self) -> usize {
        self.invocations()
            .filter(|i| i.kind == InvocationKind::Link)
            .count()
    }

    pub fn is_up_to_date(&self) -> bool {
        self.targets.iter().all(|t| !t.stale)
    }

    pub fn target(&self, name: &str) -> Option<&TargetPlan> {
        self.targets.iter().find(|t| t.name == name)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize build plan")
    }
}

/// A declared library after resolution.
#[derive(Debug, Clone)]
enum ResolvedLib {
    /// Output of another target in the same script
    Produced { target: usize, path: PathBuf },
    /// Existing library file
    File(PathBuf),
    /// Toolchain or system library, passed by name and not tracked
    System(String),
}

#[derive(Debug, Clone)]
struct ResolvedPch {
    /// Header as written in the script
    header: PathBuf,
    /// Header on disk, when it can be found
    header_file: Option<PathBuf>,
    source: PathBuf,
    artifact: PathBuf,
}

/// Turns target descriptors plus build metadata into a [`BuildPlan`].
pub struct Planner<'a> {
    ctx: &'a BuildContext,
    metadata: &'a BuildMetadata,
    checker: StalenessChecker,
}

impl<'a> Planner<'a> {
    pub fn new(ctx: &'a BuildContext, metadata: &'a BuildMetadata) -> Self {
        Planner {
            ctx,
            metadata,
            checker: StalenessChecker::new(ctx.staleness),
        }
    }

    /// Plan `selection` (all targets when empty) and everything it links against.
    pub fn plan(
        mut self,
        targets: &[TargetDescriptor],
        selection: &[String],
    ) -> Result<BuildPlan, BuildError> {
        let outputs: Vec<PathBuf> = targets.iter().map(|t| self.ctx.output_path(t)).collect();
        check_unique_outputs(targets, &outputs)?;

        // What a consumer links: the import library of a shared library
        // where the toolchain produces one, otherwise the output itself.
        let link_files: Vec<PathBuf> = targets
            .iter()
            .zip(&outputs)
            .map(|(t, output)| match t.kind {
                TargetKind::SharedLib => self.ctx.toolchain().import_library(output),
                _ => output.clone(),
            })
            .collect();

        let mut produced = HashMap::new();
        let mut by_name = HashMap::new();
        for (idx, target) in targets.iter().enumerate() {
            if target.kind.is_library() {
                produced.insert(outputs[idx].clone(), idx);
                produced.insert(link_files[idx].clone(), idx);
                by_name.insert(target.name.as_str(), idx);
            }
        }

        let libs = targets
            .iter()
            .map(|t| self.resolve_libs(t, &link_files, &produced, &by_name))
            .collect::<Result<Vec<_>, _>>()?;

        let order = build_order(targets, &libs, selection)?;

        let mut stale_targets = HashSet::new();
        let mut plans = Vec::with_capacity(order.len());
        for idx in order {
            let producer_stale = libs[idx].iter().any(|lib| {
                matches!(lib, ResolvedLib::Produced { target, .. } if stale_targets.contains(target))
            });

            let plan = self.plan_target(&targets[idx], &outputs[idx], &libs[idx], targets, producer_stale)?;
            if plan.stale {
                stale_targets.insert(idx);
            }
            plans.push(plan);
        }

        Ok(BuildPlan {
            mode: self.ctx.mode,
            targets: plans,
        })
    }

    fn plan_target(
        &mut self,
        target: &TargetDescriptor,
        output: &Path,
        libs: &[ResolvedLib],
        all: &[TargetDescriptor],
        producer_stale: bool,
    ) -> Result<TargetPlan, BuildError> {
        let ctx = self.ctx;
        let toolchain = ctx.toolchain();
        let metadata = self.metadata;
        let name = target.name.as_str();
        let stored = metadata.target(name);
        let obj_dir = ctx.obj_dir(target);

        let include_dirs: Vec<PathBuf> = target.includes.iter().map(|d| ctx.resolve(d)).collect();
        let lib_dirs: Vec<PathBuf> = target.lib_paths.iter().map(|d| ctx.resolve(d)).collect();

        let pch = target.precompiled_header.as_ref().map(|p| ResolvedPch {
            header: p.header.clone(),
            header_file: find_header(&ctx.resolve(&p.header), &p.header, &include_dirs),
            source: ctx.resolve(&p.source),
            artifact: obj_dir.join(toolchain.pch_file_name(&p.header)),
        });

        let mut sources = self.resolve_sources(target)?;
        if let Some(pch) = &pch {
            if !pch.source.is_file() {
                return Err(BuildError::io(name, &pch.source, "precompiled header source not found"));
            }
            if !sources.contains(&pch.source) {
                sources.insert(0, pch.source.clone());
            }
        }
        if sources.is_empty() {
            return Err(BuildError::config(
                name,
                format!("no source files matched {:?}", target.files),
            ));
        }

        let objects = object_paths(name, &sources, &obj_dir, toolchain.object_extension())?;

        let opts = CodegenOptions {
            mode: target.mode,
            crt: target.crt,
            warning_level: target.warning_level,
            warnings_as_errors: target.warnings_as_errors,
            disabled_warnings: target.disabled_warnings.clone(),
            position_independent: target.kind == TargetKind::SharedLib,
            platform: ctx.platform,
        };
        let cflags: Vec<String> = target
            .compile_args
            .iter()
            .chain(&ctx.extra_compile_args)
            .cloned()
            .collect();
        let compile_flags = compile_flags_hash(ctx, &opts, &include_dirs, target, &cflags);
        let link_flags = link_flags_hash(ctx, target, output, &objects, libs, &lib_dirs, all);

        let flags_changed = stored.map_or(true, |r| r.compile_flags != compile_flags);
        if flags_changed && stored.is_some() {
            tracing::debug!("target `{}`: compile flags changed", name);
        }

        // Fingerprint every input, even when dependency checking is off,
        // so the next checked build starts from a complete record.
        let mut files = BTreeMap::new();
        let mut pch_header_stale = false;
        if let Some(header) = pch.as_ref().and_then(|p| p.header_file.as_ref()) {
            pch_header_stale = self.track(name, header, stored, &mut files)?;
        }

        let mut scanner = IncludeScanner::new(include_dirs.clone());
        let mut stale_sources = Vec::with_capacity(sources.len());
        for (source, object) in sources.iter().zip(&objects) {
            let mut stale = self.track(name, source, stored, &mut files)?;
            for header in scanner.scan(source) {
                stale |= self.track(name, &header, stored, &mut files)?;
            }

            let reason = if !target.dependency_check {
                Some("dependency checking disabled")
            } else if flags_changed {
                Some("compile flags changed")
            } else if !is_nonempty_file(object) {
                Some("object file missing")
            } else if pch_header_stale {
                Some("precompiled header changed")
            } else if stale {
                Some("inputs changed")
            } else {
                None
            };
            if let Some(reason) = reason {
                tracing::debug!("target `{}`: {} is stale ({})", name, source.display(), reason);
            }
            stale_sources.push(reason.is_some());
        }

        // A rebuilt precompiled header invalidates every object that used it.
        let pch_index = pch
            .as_ref()
            .and_then(|p| sources.iter().position(|s| *s == p.source));
        if let Some(idx) = pch_index {
            if stale_sources[idx] {
                stale_sources.iter_mut().for_each(|s| *s = true);
            }
        }

        let mut tracked_libs = Vec::new();
        let mut depends_on = Vec::new();
        let mut libs_stale = producer_stale;
        for lib in libs {
            let path = match lib {
                ResolvedLib::Produced { target: idx, path } => {
                    depends_on.push(all[*idx].name.clone());
                    path
                }
                ResolvedLib::File(path) => path,
                ResolvedLib::System(_) => continue,
            };
            tracked_libs.push(path.clone());
            if !libs_stale {
                libs_stale = !path.is_file()
                    || self
                        .checker
                        .is_stale(path, stored)
                        .map_err(|e| BuildError::io(name, path, format!("{:#}", e)))?;
            }
        }

        let link_changed = stored.map_or(true, |r| r.link_flags != link_flags);
        let output_missing = !output.is_file();
        let any_source_stale = stale_sources.iter().any(|s| *s);
        let stale = any_source_stale || libs_stale || link_changed || output_missing;

        let mut plan = TargetPlan {
            name: name.to_string(),
            kind: target.kind,
            output: output.to_path_buf(),
            obj_dir: obj_dir.clone(),
            stale,
            threads: target.threads.map_or(ctx.jobs, |t| t.min(ctx.jobs)).max(1),
            objects: objects.clone(),
            depends_on,
            before_compile: None,
            precompile: None,
            compiles: Vec::new(),
            link: None,
            record: TargetRecord {
                compile_flags,
                link_flags,
                files,
            },
            tracked_libs,
        };

        if !stale {
            tracing::debug!("target `{}` is up to date", name);
            return Ok(plan);
        }

        let defines = target.parsed_defines();
        for (idx, (source, object)) in sources.iter().zip(&objects).enumerate() {
            if !stale_sources[idx] {
                continue;
            }

            let role = match pch_index {
                Some(p) if p == idx => Some(PchRole::Create),
                Some(_) => Some(PchRole::Use),
                None => None,
            };
            let input = CompileInput {
                source: source.clone(),
                output: object.clone(),
                include_dirs: include_dirs.clone(),
                defines: defines.clone(),
                cflags: cflags.clone(),
                pch: pch.as_ref().zip(role).map(|(p, role)| PchUsage {
                    header: p.header.clone(),
                    header_file: p.header_file.clone().unwrap_or_else(|| p.header.clone()),
                    artifact: p.artifact.clone(),
                    role,
                }),
            };
            let cmd = toolchain.compile_command(&input, Language::from_path(source), &opts);
            let invocation = Invocation::new(
                InvocationKind::Compile,
                name,
                cmd,
                vec![source.clone()],
                object.clone(),
            );

            if role == Some(PchRole::Create) {
                plan.precompile = Some(invocation);
            } else {
                plan.compiles.push(invocation);
            }
        }

        if any_source_stale {
            plan.before_compile = self.before_compile_invocation(target);
        }
        plan.link = Some(self.link_invocation(target, output, &objects, libs, &lib_dirs, &sources, &opts));

        tracing::debug!(
            "target `{}`: {} compile(s), 1 link",
            name,
            plan.compiled_objects().count()
        );
        Ok(plan)
    }

    /// Fingerprint `path` into `files` and report whether it changed.
    fn track(
        &mut self,
        target: &str,
        path: &Path,
        stored: Option<&TargetRecord>,
        files: &mut BTreeMap<PathBuf, FileRecord>,
    ) -> Result<bool, BuildError> {
        if let Some(current) = files.get(path) {
            return Ok(self.checker.differs(path, current, stored));
        }

        let current = self
            .checker
            .fingerprint(path)
            .map_err(|e| BuildError::io(target, path, format!("{:#}", e)))?;
        let changed = self.checker.differs(path, &current, stored);
        files.insert(path.to_path_buf(), current);
        Ok(changed)
    }

    /// The target's before-compile command, run from the script directory.
    fn before_compile_invocation(&self, target: &TargetDescriptor) -> Option<Invocation> {
        let (program, args) = target.before_compile.split_first()?;

        // A program with a directory part is script-relative; a bare name
        // is looked up on PATH.
        let program_path = Path::new(program);
        let program = if program_path.components().count() > 1 {
            self.ctx.resolve(program_path)
        } else {
            program_path.to_path_buf()
        };

        let mut invocation = Invocation::new(
            InvocationKind::Command,
            &target.name,
            CommandSpec::new(program).args(args.iter().cloned()),
            Vec::new(),
            PathBuf::new(),
        );
        invocation.cwd = Some(self.ctx.script_root.clone());
        Some(invocation)
    }

    #[allow(clippy::too_many_arguments)]
    fn link_invocation(
        &self,
        target: &TargetDescriptor,
        output: &Path,
        objects: &[PathBuf],
        libs: &[ResolvedLib],
        lib_dirs: &[PathBuf],
        sources: &[PathBuf],
        opts: &CodegenOptions,
    ) -> Invocation {
        let toolchain = self.ctx.toolchain();

        let mut lib_files = Vec::new();
        let mut system_libs = Vec::new();
        for lib in libs {
            match lib {
                ResolvedLib::Produced { path, .. } | ResolvedLib::File(path) => {
                    lib_files.push(path.clone())
                }
                ResolvedLib::System(name) => system_libs.push(name.clone()),
            }
        }

        let mut inputs = objects.to_vec();
        let cmd = if target.kind == TargetKind::StaticLib {
            toolchain.archive_command(&ArchiveInput {
                objects: objects.to_vec(),
                output: output.to_path_buf(),
            })
        } else {
            inputs.extend(lib_files.iter().cloned());
            let input = LinkInput {
                objects: objects.to_vec(),
                output: output.to_path_buf(),
                lib_dirs: lib_dirs.to_vec(),
                lib_files,
                libs: system_libs,
                ldflags: target
                    .link_args
                    .iter()
                    .chain(&self.ctx.extra_link_args)
                    .cloned()
                    .collect(),
            };
            let driver = Language::link_driver(sources.iter().map(PathBuf::as_path));
            if target.kind == TargetKind::SharedLib {
                toolchain.link_shared_command(&input, driver, opts)
            } else {
                toolchain.link_exe_command(&input, driver, opts)
            }
        };

        Invocation::new(
            InvocationKind::Link,
            &target.name,
            cmd,
            inputs,
            output.to_path_buf(),
        )
    }

    /// Expand `files` patterns into an ordered, de-duplicated source list.
    fn resolve_sources(&self, target: &TargetDescriptor) -> Result<Vec<PathBuf>, BuildError> {
        let mut seen = HashSet::new();
        let mut sources = Vec::new();

        for pattern in &target.files {
            let matches = if is_glob_pattern(pattern) {
                let found = glob_files(&self.ctx.script_root, pattern)
                    .map_err(|e| BuildError::config(&target.name, format!("{:#}", e)))?;
                if found.is_empty() {
                    tracing::warn!(
                        "target `{}`: pattern `{}` matched no files",
                        target.name,
                        pattern
                    );
                }
                found
            } else {
                let path = self.ctx.resolve(Path::new(pattern));
                if !path.is_file() {
                    return Err(BuildError::io(&target.name, &path, "source file not found"));
                }
                vec![path]
            };

            for path in matches {
                if seen.insert(path.clone()) {
                    sources.push(path);
                }
            }
        }

        Ok(sources)
    }

    fn resolve_libs(
        &self,
        target: &TargetDescriptor,
        link_files: &[PathBuf],
        produced: &HashMap<PathBuf, usize>,
        by_name: &HashMap<&str, usize>,
    ) -> Result<Vec<ResolvedLib>, BuildError> {
        let lib_dirs: Vec<PathBuf> = target.lib_paths.iter().map(|d| self.ctx.resolve(d)).collect();
        let mut resolved = Vec::with_capacity(target.libs.len());

        for lib in &target.libs {
            let as_path = Path::new(lib);

            if as_path.is_absolute() || as_path.components().count() > 1 {
                let path = self.ctx.resolve(as_path);
                if let Some(&idx) = produced.get(&path) {
                    resolved.push(ResolvedLib::Produced {
                        target: idx,
                        path: link_files[idx].clone(),
                    });
                } else if path.is_file() {
                    resolved.push(ResolvedLib::File(path));
                } else {
                    return Err(BuildError::io(&target.name, &path, "library not found"));
                }
                continue;
            }

            if let Some(&idx) = by_name.get(lib.as_str()) {
                resolved.push(ResolvedLib::Produced {
                    target: idx,
                    path: link_files[idx].clone(),
                });
                continue;
            }

            let found = lib_dirs.iter().find_map(|dir| {
                let candidate = normalize_lexically(&dir.join(lib));
                if let Some(&idx) = produced.get(&candidate) {
                    Some(ResolvedLib::Produced {
                        target: idx,
                        path: link_files[idx].clone(),
                    })
                } else if candidate.is_file() {
                    Some(ResolvedLib::File(candidate))
                } else {
                    None
                }
            });

            resolved.push(found.unwrap_or_else(|| {
                tracing::debug!(
                    "target `{}`: treating `{}` as a system library",
                    target.name,
                    lib
                );
                ResolvedLib::System(lib.clone())
            }));
        }

        Ok(resolved)
    }
}

/// Two targets may not write the same file, whether their outputs are
/// explicit or defaulted.
fn check_unique_outputs(targets: &[TargetDescriptor], outputs: &[PathBuf]) -> Result<(), BuildError> {
    let mut owners: HashMap<&Path, &str> = HashMap::new();
    for (target, output) in targets.iter().zip(outputs) {
        if let Some(previous) = owners.insert(output.as_path(), target.name.as_str()) {
            return Err(BuildError::config(
                &target.name,
                format!(
                    "output {} is already written by target `{}`",
                    output.display(),
                    previous
                ),
            ));
        }
    }
    Ok(())
}

/// Order targets so every producer precedes the targets linking it,
/// keeping declaration order otherwise.
fn build_order(
    targets: &[TargetDescriptor],
    libs: &[Vec<ResolvedLib>],
    selection: &[String],
) -> Result<Vec<usize>, BuildError> {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..targets.len()).map(|i| graph.add_node(i)).collect();

    for (consumer, target_libs) in libs.iter().enumerate() {
        for lib in target_libs {
            if let ResolvedLib::Produced { target: producer, .. } = lib {
                graph.update_edge(nodes[consumer], nodes[*producer], ());
            }
        }
    }

    if let Err(cycle) = toposort(&graph, None) {
        let name = &targets[graph[cycle.node_id()]].name;
        return Err(BuildError::config(
            name,
            "dependency cycle: the target links an output that depends on itself",
        ));
    }

    let roots: Vec<usize> = if selection.is_empty() {
        (0..targets.len()).collect()
    } else {
        targets
            .iter()
            .enumerate()
            .filter(|(_, t)| selection.contains(&t.name))
            .map(|(i, _)| i)
            .collect()
    };

    // Edges point from consumer to producer, so post-order yields producers first.
    let mut order = Vec::with_capacity(targets.len());
    let mut dfs = DfsPostOrder::empty(&graph);
    for root in roots {
        dfs.move_to(nodes[root]);
        while let Some(node) = dfs.next(&graph) {
            order.push(graph[node]);
        }
    }

    Ok(order)
}

fn find_header(resolved: &Path, header: &Path, include_dirs: &[PathBuf]) -> Option<PathBuf> {
    if resolved.is_file() {
        return Some(resolved.to_path_buf());
    }
    include_dirs
        .iter()
        .map(|dir| dir.join(header))
        .find(|candidate| candidate.is_file())
}

fn object_paths(
    target: &str,
    sources: &[PathBuf],
    obj_dir: &Path,
    extension: &str,
) -> Result<Vec<PathBuf>, BuildError> {
    let mut owners: HashMap<PathBuf, &Path> = HashMap::new();
    let mut objects = Vec::with_capacity(sources.len());

    for source in sources {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let object = obj_dir.join(format!("{}.{}", stem, extension));

        if let Some(previous) = owners.insert(object.clone(), source) {
            return Err(BuildError::config(
                target,
                format!(
                    "{} and {} would both compile to {}",
                    previous.display(),
                    source.display(),
                    object.display()
                ),
            ));
        }
        objects.push(object);
    }

    Ok(objects)
}

fn path_strings(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|p| p.display().to_string()).collect()
}

fn compile_flags_hash(
    ctx: &BuildContext,
    opts: &CodegenOptions,
    include_dirs: &[PathBuf],
    target: &TargetDescriptor,
    cflags: &[String],
) -> String {
    let toolchain = ctx.toolchain();
    let includes = path_strings(include_dirs);
    let disabled: Vec<String> = opts.disabled_warnings.iter().map(u32::to_string).collect();
    let pch = target
        .precompiled_header
        .as_ref()
        .map(|p| format!("{}|{}", p.header.display(), p.source.display()));

    let mut fp = Fingerprint::new();
    fp.update_path(toolchain.compiler_path())
        .update_path(toolchain.cxx_compiler_path())
        .update_str(opts.mode.as_str())
        .update_str(opts.crt.as_str())
        .update_str(&opts.warning_level.to_string())
        .update_bool(opts.warnings_as_errors)
        .update_strs(disabled.iter().map(String::as_str))
        .update_bool(opts.position_independent)
        .update_opt(opts.platform.map(|p| p.as_str()))
        .update_strs(includes.iter().map(String::as_str))
        .update_strs(target.defines.iter().map(String::as_str))
        .update_strs(cflags.iter().map(String::as_str))
        .update_opt(pch.as_deref());
    fp.finish_short()
}

fn link_flags_hash(
    ctx: &BuildContext,
    target: &TargetDescriptor,
    output: &Path,
    objects: &[PathBuf],
    libs: &[ResolvedLib],
    lib_dirs: &[PathBuf],
    all: &[TargetDescriptor],
) -> String {
    let toolchain = ctx.toolchain();
    let objects = path_strings(objects);
    let lib_dirs = path_strings(lib_dirs);
    let libs: Vec<String> = libs
        .iter()
        .map(|lib| match lib {
            ResolvedLib::Produced { target, path } => {
                format!("target:{}:{}", all[*target].name, path.display())
            }
            ResolvedLib::File(path) => format!("file:{}", path.display()),
            ResolvedLib::System(name) => format!("system:{}", name),
        })
        .collect();

    let mut fp = Fingerprint::new();
    fp.update_str(target.kind.as_str())
        .update_path(toolchain.linker_path())
        .update_path(toolchain.archiver_path())
        .update_str(target.mode.as_str())
        .update_str(target.crt.as_str())
        .update_opt(ctx.platform.map(|p| p.as_str()))
        .update_path(output)
        .update_strs(objects.iter().map(String::as_str))
        .update_strs(lib_dirs.iter().map(String::as_str))
        .update_strs(libs.iter().map(String::as_str))
        .update_strs(target.link_args.iter().map(String::as_str))
        .update_strs(ctx.extra_link_args.iter().map(String::as_str));
    fp.finish_short()
}
