//! Dockyard - dependency-aware orchestration for Docker Compose projects
//!
//! Dockyard manages many independent Compose projects that live in
//! separate directories under one workspace root. It provides:
//!
//! - Start/stop ordering from declared dependencies
//! - Readiness probes (HTTP, TCP port, command, compose service status)
//! - Custom commands and hooks run across any selection of projects
//! - Safety-checked git status, pull and sync

pub mod error;
pub mod git;
pub mod orchestrator;
pub mod process;
pub mod project;
pub mod readiness;

pub use error::{DockyardError, Result};
