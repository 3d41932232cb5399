//! Version-control synchronization across projects
//!
//! `status`, `pull` and `sync` run per project through the operation
//! executor like any other operation, with their own safety checks.

pub mod repo;
pub mod sync;

pub use repo::{GitRepo, GitStatus};
pub use sync::{GitOperation, GitTask};
