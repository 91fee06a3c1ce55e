//! C/C++ build engine.
//!
//! Staleness checking, invocation planning, and parallel execution.

pub mod context;
pub mod depends;
pub mod executor;
pub mod metadata;
pub mod plan;
pub mod staleness;
pub mod toolchain;

pub use context::BuildContext;
pub use executor::{BuildExecutor, BuildProgress, InvocationRunner, ProcessRunner, RunOutput};
pub use metadata::BuildMetadata;
pub use plan::{BuildPlan, Invocation, InvocationKind, Planner, TargetPlan};
pub use staleness::StalenessPolicy;
pub use toolchain::{detect_toolchain, CommandSpec, GccToolchain, MsvcToolchain, Toolchain, ToolchainPlatform};
