//! Safety-checked git status, pull and sync

use super::repo::GitRepo;
use crate::orchestrator::executor::{ExecutionResult, ProjectTask, TaskContext};
use crate::project::Project;
use async_trait::async_trait;

/// Git operation dispatched per project
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitOperation {
    /// Report branch, upstream distance and local changes
    Status,
    /// Pull, refusing to clobber local work unless forced
    Pull {
        /// Skip the uncommitted-changes and local-commits checks
        force: bool,
        /// Rebase local commits instead of merging
        rebase: bool,
    },
    /// Fetch, then fast-forward when that is safe
    Sync,
}

impl GitOperation {
    /// Operation name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status => "git status",
            Self::Pull { .. } => "git pull",
            Self::Sync => "git sync",
        }
    }
}

/// Runs a [`GitOperation`] as an executor task
pub struct GitTask {
    op: GitOperation,
}

impl GitTask {
    /// Create a new task
    pub fn new(op: GitOperation) -> Self {
        Self { op }
    }
}

#[async_trait]
impl ProjectTask for GitTask {
    fn name(&self) -> &str {
        self.op.name()
    }

    async fn run(&self, project: &Project, ctx: &TaskContext<'_>) -> ExecutionResult {
        let repo = GitRepo::new(ctx.runner, &project.directory(ctx.root));

        if !repo.is_work_tree().await {
            return ExecutionResult::failed(
                &project.name,
                format!("{} is not a git repository", project.name),
            );
        }

        match self.op {
            GitOperation::Status => status(&repo, project).await,
            GitOperation::Pull { force, rebase } => pull(&repo, project, force, rebase).await,
            GitOperation::Sync => sync(&repo, project).await,
        }
    }
}

async fn status(repo: &GitRepo<'_>, project: &Project) -> ExecutionResult {
    match repo.status().await {
        Ok(status) => ExecutionResult::succeeded(&project.name, Some(status.to_string())),
        Err(e) => ExecutionResult::failed(&project.name, e.to_string()),
    }
}

async fn pull(repo: &GitRepo<'_>, project: &Project, force: bool, rebase: bool) -> ExecutionResult {
    if !force {
        match repo.is_dirty().await {
            Ok(true) => {
                return ExecutionResult::failed(
                    &project.name,
                    format!(
                        "{} has uncommitted changes; commit or stash them, or pull with --force",
                        project.name
                    ),
                )
            }
            Ok(false) => {}
            Err(e) => return ExecutionResult::failed(&project.name, e.to_string()),
        }
    }

    if !force && !rebase && repo.upstream().await.is_some() {
        match repo.ahead_behind().await {
            Ok((ahead, _)) if ahead > 0 => {
                return ExecutionResult::failed(
                    &project.name,
                    format!(
                        "{} has {} local commit(s) not on the remote; pull with --rebase or --force",
                        project.name, ahead
                    ),
                )
            }
            Ok(_) => {}
            Err(e) => return ExecutionResult::failed(&project.name, e.to_string()),
        }
    }

    let args: &[&str] = if rebase { &["pull", "--rebase"] } else { &["pull"] };
    match repo.git(args).await {
        Ok(output) if output.success() => {
            tracing::info!("Pulled {}", project.name);
            ExecutionResult::succeeded(&project.name, None).with_output(output.stdout.trim())
        }
        Ok(output) => ExecutionResult::failed(
            &project.name,
            format!(
                "git pull failed in {}: {}",
                project.name,
                output.stderr.trim()
            ),
        ),
        Err(e) => ExecutionResult::failed(&project.name, e.to_string()),
    }
}

async fn sync(repo: &GitRepo<'_>, project: &Project) -> ExecutionResult {
    if let Err(e) = repo.fetch().await {
        return ExecutionResult::failed(&project.name, e.to_string());
    }

    let skip = |reason: String| {
        tracing::warn!("Skipping sync of {}: {}", project.name, reason);
        ExecutionResult::skipped(&project.name, reason)
    };

    match repo.is_dirty().await {
        Ok(true) => return skip("uncommitted changes".to_string()),
        Ok(false) => {}
        Err(e) => return ExecutionResult::failed(&project.name, e.to_string()),
    }

    let Some(upstream) = repo.upstream().await else {
        return skip("no upstream branch".to_string());
    };

    let (ahead, behind) = match repo.ahead_behind().await {
        Ok(counts) => counts,
        Err(e) => return ExecutionResult::failed(&project.name, e.to_string()),
    };

    if behind == 0 {
        return ExecutionResult::skipped(&project.name, format!("up to date with {}", upstream));
    }
    if ahead > 0 {
        return skip(format!(
            "diverged from {} ({} local, {} remote commit(s))",
            upstream, ahead, behind
        ));
    }

    match repo.git(&["pull", "--ff-only"]).await {
        Ok(output) if output.success() => ExecutionResult::succeeded(
            &project.name,
            Some(format!("fast-forwarded {} commit(s) from {}", behind, upstream)),
        ),
        Ok(output) => ExecutionResult::failed(
            &project.name,
            format!(
                "git pull --ff-only failed in {}: {}",
                project.name,
                output.stderr.trim()
            ),
        ),
        Err(e) => ExecutionResult::failed(&project.name, e.to_string()),
    }
}
