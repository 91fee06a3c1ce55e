//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// fbuild - an incremental build engine for C and C++ targets
#[derive(Parser)]
#[command(name = "fbuild")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the targets declared in FBuild.toml
    Build(BuildArgs),

    /// Print the invocations a build would run, as JSON
    Plan(ScriptArgs),

    /// Remove objects, outputs, and build metadata for one mode
    Clean(CleanArgs),

    /// Show the detected toolchain
    Toolchain(ToolchainArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Script selection shared by `build` and `plan`.
#[derive(Args)]
pub struct ScriptArgs {
    /// Build mode: Debug or Release
    #[arg(long = "build", value_name = "MODE")]
    pub mode: Option<String>,

    /// Treat every source as stale
    #[arg(long)]
    pub rebuild: bool,

    /// Build script, or a directory containing FBuild.toml
    #[arg(long, env = "FBUILD_SCRIPT")]
    pub script: Option<PathBuf>,

    /// Script argument substituted into `{key}` placeholders
    #[arg(long = "arg", value_name = "KEY=VALUE")]
    pub args: Vec<String>,

    /// Specific targets to build (their libraries are included)
    #[arg(long)]
    pub target: Vec<String>,
}

#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub script: ScriptArgs,

    /// Number of parallel compiles
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Args)]
pub struct CleanArgs {
    /// Build mode to clean: Debug or Release
    #[arg(long = "build", value_name = "MODE")]
    pub mode: Option<String>,

    /// Build script, or a directory containing FBuild.toml
    #[arg(long, env = "FBUILD_SCRIPT")]
    pub script: Option<PathBuf>,

    /// Script argument substituted into `{key}` placeholders
    #[arg(long = "arg", value_name = "KEY=VALUE")]
    pub args: Vec<String>,
}

#[derive(Args)]
pub struct ToolchainArgs {
    /// Build script whose configuration should be used
    #[arg(long, env = "FBUILD_SCRIPT")]
    pub script: Option<PathBuf>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}
