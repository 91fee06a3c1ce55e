//! `fbuild plan` command

use anyhow::Result;

use crate::cli::ScriptArgs;
use fbuild::ops::plan;

pub fn execute(args: ScriptArgs) -> Result<()> {
    let opts = args.into_options(None, false);
    let plan = plan(&opts)?;

    println!("{}", plan.to_json()?);
    Ok(())
}
