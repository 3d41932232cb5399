//! Workspace projects and their configuration
//!
//! Projects, groups, dependencies and operation definitions are loaded once
//! from a workspace file and read through the [`ProjectRegistry`] trait.

pub mod config;
pub mod parser;
pub mod registry;

pub use config::{
    DependencyMap, GroupMap, OperationMap, OperationSpec, Project, ReadinessPolicy,
    ReadinessSpec, Settings, TargetSpec, WorkspaceConfig,
};
pub use parser::WorkspaceParser;
pub use registry::{ProjectRegistry, Workspace};
