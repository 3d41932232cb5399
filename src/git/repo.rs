//! Git queries run through the process runner

use crate::error::{DockyardError, Result};
use crate::process::{ProcessOptions, ProcessOutput, ProcessRunner};
use std::fmt;
use std::path::{Path, PathBuf};

/// Executable used for git commands
pub const GIT: &str = "git";

/// Snapshot of a working tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitStatus {
    /// Current branch
    pub branch: String,
    /// Upstream branch, if tracking one
    pub upstream: Option<String>,
    /// Local commits not on the upstream
    pub ahead: u32,
    /// Upstream commits not in the local branch
    pub behind: u32,
    /// Uncommitted changes present
    pub dirty: bool,
}

impl fmt::Display for GitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.branch)?;
        match self.upstream {
            Some(ref upstream) if self.ahead == 0 && self.behind == 0 => {
                write!(f, " (up to date with {})", upstream)?
            }
            Some(ref upstream) => write!(
                f,
                " (ahead {}, behind {} {})",
                self.ahead, self.behind, upstream
            )?,
            None => write!(f, " (no upstream)")?,
        }
        if self.dirty {
            write!(f, " [uncommitted changes]")?;
        }
        Ok(())
    }
}

/// A project directory seen as a git repository
pub struct GitRepo<'a> {
    runner: &'a dyn ProcessRunner,
    dir: PathBuf,
}

impl<'a> GitRepo<'a> {
    /// Open the repository at `dir`
    pub fn new(runner: &'a dyn ProcessRunner, dir: &Path) -> Self {
        Self {
            runner,
            dir: dir.to_path_buf(),
        }
    }

    /// Run git with captured output
    pub async fn git(&self, args: &[&str]) -> Result<ProcessOutput> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let options = ProcessOptions::new().cwd(&self.dir);
        self.runner.run(GIT, &args, &options).await
    }

    /// Run git and require success, returning trimmed stdout
    async fn query(&self, args: &[&str]) -> Result<String> {
        let output = self.git(args).await?;
        if !output.success() {
            return Err(DockyardError::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                output.stderr.trim()
            )));
        }
        Ok(output.stdout.trim().to_string())
    }

    /// Whether the directory is inside a work tree
    pub async fn is_work_tree(&self) -> bool {
        match self.git(&["rev-parse", "--is-inside-work-tree"]).await {
            Ok(output) => output.success() && output.stdout.trim() == "true",
            Err(_) => false,
        }
    }

    /// Current branch name
    pub async fn branch(&self) -> Result<String> {
        self.query(&["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    /// Whether there are uncommitted changes
    pub async fn is_dirty(&self) -> Result<bool> {
        Ok(!self.query(&["status", "--porcelain"]).await?.is_empty())
    }

    /// Upstream branch, `None` when not tracking
    pub async fn upstream(&self) -> Option<String> {
        let output = self
            .git(&["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"])
            .await
            .ok()?;
        let upstream = output.stdout.trim();
        (output.success() && !upstream.is_empty()).then(|| upstream.to_string())
    }

    /// Commits ahead of and behind the upstream
    pub async fn ahead_behind(&self) -> Result<(u32, u32)> {
        let counts = self
            .query(&["rev-list", "--left-right", "--count", "HEAD...@{u}"])
            .await?;
        parse_counts(&counts)
    }

    /// Fetch from the default remote
    pub async fn fetch(&self) -> Result<()> {
        self.query(&["fetch", "--quiet"]).await.map(|_| ())
    }

    /// Full status snapshot
    pub async fn status(&self) -> Result<GitStatus> {
        let branch = self.branch().await?;
        let dirty = self.is_dirty().await?;
        let upstream = self.upstream().await;
        let (ahead, behind) = match upstream {
            Some(_) => self.ahead_behind().await?,
            None => (0, 0),
        };

        Ok(GitStatus {
            branch,
            upstream,
            ahead,
            behind,
            dirty,
        })
    }
}

fn parse_counts(counts: &str) -> Result<(u32, u32)> {
    let mut parts = counts.split_whitespace().map(str::parse::<u32>);
    match (parts.next(), parts.next()) {
        (Some(Ok(ahead)), Some(Ok(behind))) => Ok((ahead, behind)),
        _ => Err(DockyardError::Git(format!("unexpected rev-list output: {}", counts))),
    }
}
