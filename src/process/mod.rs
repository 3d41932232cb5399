//! Process execution
//!
//! Everything that shells out (`docker compose`, `git`, custom commands and
//! command probes) goes through the [`ProcessRunner`] trait.

pub mod compose;
pub mod runner;
#[cfg(test)]
pub mod testing;

pub use compose::{ComposeCommand, ServiceStatus};
pub use runner::{ProcessOptions, ProcessOutput, ProcessRunner, Stdio, SystemProcessRunner};
