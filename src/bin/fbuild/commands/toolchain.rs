//! `fbuild toolchain` command

use anyhow::{Context, Result};

use crate::cli::ToolchainArgs;
use fbuild::builder::BuildContext;
use fbuild::core::BuildMode;
use fbuild::ops::fbuild_build::config_for;
use fbuild::util::config::load_config_for;

pub fn execute(args: ToolchainArgs) -> Result<()> {
    // Outside a project, fall back to global config and the environment
    let (root, config) = match config_for(args.script.as_deref()) {
        Ok(found) => found,
        Err(_) => {
            let cwd = std::env::current_dir().context("failed to get current directory")?;
            let config = load_config_for(&cwd);
            (cwd, config)
        }
    };

    let ctx = BuildContext::new(&root, BuildMode::default(), &config, None)?;
    let toolchain = ctx.toolchain();

    println!("Toolchain: {}", toolchain.platform().as_str());
    println!();
    println!("  CC:     {}", toolchain.compiler_path().display());
    if let Some(version) = ctx.compiler_version() {
        println!("          version {}", version);
    }
    println!("  CXX:    {}", toolchain.cxx_compiler_path().display());
    println!("  AR:     {}", toolchain.archiver_path().display());
    println!("  LINK:   {}", toolchain.linker_path().display());
    println!();
    println!("  Jobs:       {}", ctx.jobs);
    println!("  Staleness:  {:?}", ctx.staleness);
    if !ctx.extra_compile_args.is_empty() {
        println!("  Compile args: {}", ctx.extra_compile_args.join(" "));
    }
    if !ctx.extra_link_args.is_empty() {
        println!("  Link args:    {}", ctx.extra_link_args.join(" "));
    }

    println!();
    println!("Environment:");
    for key in ["CC", "CXX", "AR", "FBUILD_JOBS", "FBUILD_COMPILE_ARGS"] {
        if let Ok(value) = std::env::var(key) {
            println!("  {}={}", key, value);
        }
    }

    Ok(())
}
