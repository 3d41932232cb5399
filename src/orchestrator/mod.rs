//! Orchestration engine
//!
//! Target selection, dependency ordering and the operation executor, plus
//! the adapters built on top of them: custom commands, hooks and the
//! up/down/restart lifecycle.

pub mod dependency;
pub mod executor;
pub mod hooks;
pub mod lifecycle;
pub mod target;

pub use dependency::{DependencyResolver, Resolution};
pub use executor::{
    AggregateResult, ExecutionOptions, ExecutionResult, Operation, OperationExecutor, ProjectTask,
    TaskContext,
};
pub use hooks::{run_custom_command, run_hook, RunOverrides};
pub use lifecycle::{Orchestrator, ReadinessReport};
pub use target::TargetSelector;
