//! fbuild - a small build-description engine for C and C++
//!
//! Targets are declared in an `FBuild.toml` script (or directly through
//! [`TargetDescriptor`]'s fluent API). fbuild works out which sources are
//! stale, plans the compiler and linker invocations, runs the compiles of
//! each target in parallel, and records fingerprints so the next run is
//! incremental.

pub mod builder;
pub mod core;
pub mod ops;
pub mod util;

/// Test utilities for fbuild unit tests.
///
/// Only compiled for tests: a recording invocation runner and on-disk
/// project fixtures.
#[cfg(test)]
pub mod test_support;

pub use crate::builder::{BuildContext, BuildPlan, Invocation};
pub use crate::core::{BuildError, BuildMode, BuildScript, TargetDescriptor, TargetKind};
