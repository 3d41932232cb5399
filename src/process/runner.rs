//! Child process execution

use crate::error::{DockyardError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// Grace period between SIGTERM and SIGKILL for timed out processes
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

/// How the child's standard streams are wired
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stdio {
    /// stdout/stderr are piped and returned
    #[default]
    Captured,
    /// The child shares the controlling terminal
    Inherit,
}

/// Options for spawning a process
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Variables overlaid on the ambient environment
    pub env: HashMap<String, String>,
    /// Stream wiring
    pub stdio: Stdio,
    /// Kill the process after this long
    pub timeout: Option<Duration>,
}

impl ProcessOptions {
    /// Captured output, no timeout
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the working directory
    pub fn cwd(mut self, cwd: &Path) -> Self {
        self.cwd = Some(cwd.to_path_buf());
        self
    }

    /// Overlay environment variables
    pub fn envs(mut self, env: &HashMap<String, String>) -> Self {
        self.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Set the stream wiring
    pub fn stdio(mut self, stdio: Stdio) -> Self {
        self.stdio = stdio;
        self
    }

    /// Set the timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Result of a finished (or terminated) process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` if killed by a signal or timed out
    pub exit_code: Option<i32>,
    /// Captured stdout (empty when inherited)
    pub stdout: String,
    /// Captured stderr (empty when inherited)
    pub stderr: String,
    /// The process was terminated for exceeding its timeout
    pub timed_out: bool,
}

impl ProcessOutput {
    /// Output of a process that exited with `code`
    pub fn exited(code: i32, stdout: &str, stderr: &str) -> Self {
        Self {
            exit_code: Some(code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            timed_out: false,
        }
    }

    /// Whether the process exited with code 0 in time
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Spawns child processes
///
/// Returns `Err` only when the process could not be started at all; a
/// non-zero exit or a timeout is reported through [`ProcessOutput`].
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `program` with `args` to completion
    async fn run(&self, program: &str, args: &[String], options: &ProcessOptions)
        -> Result<ProcessOutput>;
}

/// Runner backed by real OS processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessRunner;

impl SystemProcessRunner {
    /// Create a new runner
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        options: &ProcessOptions,
    ) -> Result<ProcessOutput> {
        tracing::debug!("Spawning {} {:?} in {:?}", program, args, options.cwd);

        let mut cmd = Command::new(program);
        cmd.args(args).envs(&options.env).kill_on_drop(true);

        if let Some(ref cwd) = options.cwd {
            cmd.current_dir(cwd);
        }

        match options.stdio {
            Stdio::Captured => {
                cmd.stdin(std::process::Stdio::null())
                    .stdout(std::process::Stdio::piped())
                    .stderr(std::process::Stdio::piped());
            }
            Stdio::Inherit => {
                cmd.stdin(std::process::Stdio::inherit())
                    .stdout(std::process::Stdio::inherit())
                    .stderr(std::process::Stdio::inherit());
            }
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| DockyardError::Process(format!("{}: {}", program, e)))?;

        let stdout_task = child.stdout.take().map(|out| tokio::spawn(read_all(out)));
        let stderr_task = child.stderr.take().map(|err| tokio::spawn(read_all(err)));

        let status = match options.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => Some(status?),
                Err(_) => {
                    tracing::debug!("{} exceeded {:?}, terminating", program, limit);
                    terminate(&mut child).await;
                    None
                }
            },
            None => Some(child.wait().await?),
        };

        let Some(status) = status else {
            // Orphaned grandchildren may hold the pipes open
            for task in [stdout_task, stderr_task].into_iter().flatten() {
                task.abort();
            }
            return Ok(ProcessOutput {
                timed_out: true,
                ..Default::default()
            });
        };

        Ok(ProcessOutput {
            exit_code: status.code(),
            stdout: collect(stdout_task).await,
            stderr: collect(stderr_task).await,
            timed_out: false,
        })
    }
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        tracing::debug!("Failed to read child output: {}", e);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn collect(task: Option<JoinHandle<String>>) -> String {
    match task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    }
}

/// SIGTERM, then SIGKILL if the child ignores it
async fn terminate(child: &mut Child) {
    if send_sigterm(child)
        && tokio::time::timeout(TERMINATE_GRACE, child.wait())
            .await
            .is_ok()
    {
        return;
    }

    if let Err(e) = child.kill().await {
        tracing::warn!("Failed to kill process: {}", e);
    }
}

#[cfg(unix)]
fn send_sigterm(child: &Child) -> bool {
    match child.id() {
        // SAFETY: kill(2) has no memory-safety preconditions
        Some(pid) => unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) == 0 },
        None => false,
    }
}

#[cfg(not(unix))]
fn send_sigterm(_child: &Child) -> bool {
    false
}
