//! `fbuild clean` command

use anyhow::Result;

use crate::cli::CleanArgs;
use fbuild::ops::{clean, BuildOptions, BuildSession};

pub fn execute(args: CleanArgs) -> Result<()> {
    let opts = BuildOptions {
        mode: args.mode,
        script: args.script,
        args: args.args,
        ..Default::default()
    };
    let session = BuildSession::open(&opts)?;

    let result = clean(&session.script, &session.ctx)?;
    for path in &result.removed {
        eprintln!("     Removed {}", path.display());
    }
    if result.removed.is_empty() {
        eprintln!("     Nothing to clean in {}", session.ctx.mode_dir.display());
    }

    Ok(())
}
