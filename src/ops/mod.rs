//! High-level operations.
//!
//! This module contains the implementation of fbuild commands.

pub mod fbuild_build;
pub mod fbuild_clean;

pub use fbuild_build::{build, plan, BuildOptions, BuildResult, BuildSession};
pub use fbuild_clean::{clean, CleanResult};
