//! Error types for Dockyard

use thiserror::Error;

/// Result type for Dockyard operations
pub type Result<T> = std::result::Result<T, DockyardError>;

/// Dockyard error types
///
/// Probe failures and per-project command failures are reported as values
/// (`bool`, [`ExecutionResult`](crate::orchestrator::ExecutionResult)) and
/// never show up here.
#[derive(Error, Debug)]
pub enum DockyardError {
    #[error("Workspace file not found: {0}")]
    WorkspaceNotFound(String),

    #[error("Workspace file parse error: {0}")]
    WorkspaceParse(String),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Environment not found: {0}")]
    EnvironmentNotFound(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Readiness error: {0}")]
    Readiness(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Operation aborted in {project}: {message}")]
    OperationAborted { project: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
