//! Core data structures for fbuild.
//!
//! - Target descriptors and their fluent declaration API
//! - Build scripts (`FBuild.toml`) and script arguments
//! - The build error taxonomy

pub mod errors;
pub mod script;
pub mod target;

pub use errors::BuildError;
pub use script::{BuildScript, ScriptArgs, SCRIPT_NAME};
pub use target::{
    BuildMode, Crt, Platform, PrecompiledHeader, TargetDescriptor, TargetKind, ToolchainKind,
};
