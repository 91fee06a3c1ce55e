//! Implementation of `fbuild clean`.

use std::path::PathBuf;

use anyhow::Result;

use crate::builder::context::STATE_DIR;
use crate::builder::BuildContext;
use crate::core::script::BuildScript;
use crate::core::target::TargetKind;
use crate::util::fs::{remove_dir_all_if_exists, remove_file_if_exists};

/// What `clean` removed.
#[derive(Debug, Default)]
pub struct CleanResult {
    pub removed: Vec<PathBuf>,
}

/// Remove every object directory, output, and the build metadata for the
/// script's targets in `ctx`'s mode.
pub fn clean(script: &BuildScript, ctx: &BuildContext) -> Result<CleanResult> {
    let mut result = CleanResult::default();

    for target in script.targets() {
        let obj_dir = ctx.obj_dir(target);
        if obj_dir.is_dir() {
            remove_dir_all_if_exists(&obj_dir)?;
            result.removed.push(obj_dir);
        }

        let output = ctx.output_path(target);
        if target.kind == TargetKind::SharedLib {
            let import = ctx.toolchain().import_library(&output);
            if import != output && remove_file_if_exists(&import)? {
                result.removed.push(import);
            }
        }
        if remove_file_if_exists(&output)? {
            result.removed.push(output);
        }
    }

    let obj_root = ctx.mode_dir.join("obj");
    if obj_root.is_dir() && std::fs::read_dir(&obj_root)?.next().is_none() {
        remove_dir_all_if_exists(&obj_root)?;
    }

    let state_dir = ctx.mode_dir.join(STATE_DIR);
    if state_dir.is_dir() {
        remove_dir_all_if_exists(&state_dir)?;
        result.removed.push(state_dir);
    }

    tracing::debug!("Removed {} path(s) under {}", result.removed.len(), ctx.mode_dir.display());
    Ok(result)
}
