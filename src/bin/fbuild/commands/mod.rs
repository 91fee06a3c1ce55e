//! Command implementations

pub mod build;
pub mod clean;
pub mod completions;
pub mod plan;
pub mod toolchain;

use fbuild::ops::BuildOptions;

use crate::cli::ScriptArgs;

impl ScriptArgs {
    pub fn into_options(self, jobs: Option<usize>, verbose: bool) -> BuildOptions {
        BuildOptions {
            mode: self.mode,
            rebuild: self.rebuild,
            jobs,
            script: self.script,
            args: self.args,
            targets: self.target,
            verbose,
        }
    }
}
