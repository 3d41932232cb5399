//! Workspace lifecycle: up, down and restart

use super::dependency::{DependencyResolver, Resolution};
use super::executor::{
    AggregateResult, ExecutionOptions, ExecutionResult, Operation, OperationExecutor, ProjectTask,
    TaskContext,
};
use super::hooks::{run_custom_command, run_hook, RunOverrides};
use super::target::TargetSelector;
use crate::error::{DockyardError, Result};
use crate::git::{GitOperation, GitTask};
use crate::process::compose::{find_compose_file, DOCKER};
use crate::process::{ComposeCommand, ProcessOptions, ProcessRunner, Stdio, SystemProcessRunner};
use crate::project::{Project, ProjectRegistry, ReadinessPolicy, TargetSpec};
use crate::readiness::{Dependency, ReadinessChecker};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Readiness of one selected project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessReport {
    /// Project name
    pub project: String,
    /// `None` when the project has no readiness check
    pub ready: Option<bool>,
}

/// Drives the workspace through the operation executor
pub struct Orchestrator {
    /// Project registry
    registry: Arc<dyn ProjectRegistry>,
    /// Operation executor
    executor: OperationExecutor,
    /// Readiness checker
    checker: Arc<ReadinessChecker>,
}

impl Orchestrator {
    /// Create a new orchestrator
    pub fn new(
        registry: Arc<dyn ProjectRegistry>,
        runner: Arc<dyn ProcessRunner>,
        checker: Arc<ReadinessChecker>,
    ) -> Self {
        let executor = OperationExecutor::new(runner, registry.root().to_path_buf());
        Self {
            registry,
            executor,
            checker,
        }
    }

    /// Orchestrator spawning real processes
    pub fn system(registry: Arc<dyn ProjectRegistry>) -> Result<Self> {
        let runner: Arc<dyn ProcessRunner> = Arc::new(SystemProcessRunner::new());
        let checker = Arc::new(ReadinessChecker::system(runner.clone())?);
        Ok(Self::new(registry, runner, checker))
    }

    /// Project registry
    pub fn registry(&self) -> &dyn ProjectRegistry {
        self.registry.as_ref()
    }

    /// Operation executor
    pub fn executor(&self) -> &OperationExecutor {
        &self.executor
    }

    /// Target of a named environment
    pub fn environment(&self, name: &str) -> Result<TargetSpec> {
        self.registry
            .environment(name)
            .cloned()
            .ok_or_else(|| DockyardError::EnvironmentNotFound(name.to_string()))
    }

    /// Select and order the projects of a target
    pub fn order(&self, target: Option<&TargetSpec>) -> Resolution {
        let selected =
            TargetSelector::select(self.registry.projects(), target, self.registry.groups());
        DependencyResolver::resolve(&selected, self.registry.dependencies())
    }

    /// Start the selected projects in dependency order
    ///
    /// Projects start one at a time and the first failure stops the run.
    /// Before each start the in-set dependencies that have a readiness check
    /// are waited for; a project without one is followed by the workspace
    /// startup delay.
    pub async fn up(&self, target: Option<&TargetSpec>) -> AggregateResult {
        let resolution = self.order(target);
        let settings = self.registry.settings();

        let task = UpTask {
            waits: self.readiness_waits(&resolution.order),
            checker: self.checker.clone(),
            policy: settings.readiness.clone(),
            startup_delay: settings.startup_delay(),
            remaining: AtomicUsize::new(resolution.order.len()),
        };

        tracing::info!("Starting {}", resolution.names().join(", "));
        self.executor
            .run(
                &resolution.order,
                &Operation::Task(Arc::new(task)),
                &ExecutionOptions::new(),
            )
            .await
    }

    /// Stop the selected projects, dependents first
    pub async fn down(&self, target: Option<&TargetSpec>) -> AggregateResult {
        let order = self.order(target).reversed();

        tracing::info!(
            "Stopping {}",
            order.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", ")
        );
        self.executor
            .run(
                &order,
                &Operation::Task(Arc::new(DownTask)),
                &ExecutionOptions::new(),
            )
            .await
    }

    /// Stop then start the selected projects
    ///
    /// Results of both passes are reported; the restart stops early when
    /// the stop pass fails.
    pub async fn restart(&self, target: Option<&TargetSpec>) -> AggregateResult {
        let down = self.down(target).await;
        if !down.success {
            return down;
        }

        let up = self.up(target).await;
        let mut results = down.results;
        results.extend(up.results);
        AggregateResult {
            success: up.success,
            results,
            aborted: up.aborted,
        }
    }

    /// Probe the selected projects once, without retries
    pub async fn check(&self, target: Option<&TargetSpec>) -> Vec<ReadinessReport> {
        let selected =
            TargetSelector::select(self.registry.projects(), target, self.registry.groups());
        let root = self.registry.root();

        let mut reports = Vec::with_capacity(selected.len());
        for project in selected {
            let ready = match project.readiness {
                Some(_) => Some(self.checker.check_dependency_readiness(&project, root).await),
                None => None,
            };
            reports.push(ReadinessReport {
                project: project.name.clone(),
                ready,
            });
        }
        reports
    }

    /// Run a custom command
    pub async fn run_command(&self, name: &str, overrides: &RunOverrides) -> Result<AggregateResult> {
        run_custom_command(self.registry.as_ref(), &self.executor, name, overrides).await
    }

    /// Run a hook
    pub async fn run_hook(&self, name: &str, overrides: &RunOverrides) -> AggregateResult {
        run_hook(self.registry.as_ref(), &self.executor, name, overrides).await
    }

    /// Run a git operation on the selected projects
    pub async fn git(&self, op: GitOperation, overrides: &RunOverrides) -> AggregateResult {
        let targets = TargetSelector::select(
            self.registry.projects(),
            overrides.target.as_ref(),
            self.registry.groups(),
        );
        let options = ExecutionOptions::new()
            .parallel(overrides.parallel.unwrap_or(false))
            .continue_on_error(overrides.continue_on_error);

        self.executor
            .run(&targets, &Operation::Task(Arc::new(GitTask::new(op))), &options)
            .await
    }

    /// In-set dependencies with a readiness check, per project
    fn readiness_waits(&self, order: &[Project]) -> HashMap<String, Vec<Dependency>> {
        let root = self.registry.root();
        let in_set: HashSet<&str> = order.iter().map(|p| p.name.as_str()).collect();

        let mut waits = HashMap::new();
        for project in order {
            let Some(deps) = self.registry.dependencies().get(&project.name) else {
                continue;
            };
            let list: Vec<Dependency> = deps
                .iter()
                .filter(|d| in_set.contains(d.as_str()))
                .filter_map(|d| self.registry.project(d))
                .filter_map(|d| Dependency::of(d, root))
                .collect();
            if !list.is_empty() {
                waits.insert(project.name.clone(), list);
            }
        }
        waits
    }
}

/// Starts one project
struct UpTask {
    waits: HashMap<String, Vec<Dependency>>,
    checker: Arc<ReadinessChecker>,
    policy: ReadinessPolicy,
    startup_delay: Duration,
    remaining: AtomicUsize,
}

#[async_trait]
impl ProjectTask for UpTask {
    fn name(&self) -> &str {
        "up"
    }

    async fn run(&self, project: &Project, ctx: &TaskContext<'_>) -> ExecutionResult {
        let remaining = self.remaining.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        let dir = project.directory(ctx.root);

        if find_compose_file(&dir).is_none() {
            return ExecutionResult::failed(
                &project.name,
                format!("No compose file in {}", dir.display()),
            );
        }

        if let Some(deps) = self.waits.get(&project.name) {
            tracing::info!(
                "Waiting for {} before starting {}",
                deps.iter().map(|d| d.name.as_str()).collect::<Vec<_>>().join(", "),
                project.name
            );
            if !self.checker.wait_for(deps, &dir, &self.policy).await {
                return ExecutionResult::failed(
                    &project.name,
                    format!("Dependencies of {} are not ready", project.name),
                );
            }
        }

        let result = compose(ctx, project, &dir, ComposeCommand::Up).await;

        if result.success && project.readiness.is_none() && remaining > 0 {
            tracing::debug!(
                "Waiting {}ms for {} to settle",
                self.startup_delay.as_millis(),
                project.name
            );
            tokio::time::sleep(self.startup_delay).await;
        }

        result
    }
}

/// Stops one project
struct DownTask;

#[async_trait]
impl ProjectTask for DownTask {
    fn name(&self) -> &str {
        "down"
    }

    async fn run(&self, project: &Project, ctx: &TaskContext<'_>) -> ExecutionResult {
        let dir = project.directory(ctx.root);
        if find_compose_file(&dir).is_none() {
            return ExecutionResult::skipped(&project.name, "no compose file");
        }
        compose(ctx, project, &dir, ComposeCommand::Down).await
    }
}

async fn compose(
    ctx: &TaskContext<'_>,
    project: &Project,
    dir: &Path,
    command: ComposeCommand,
) -> ExecutionResult {
    let stdio = if ctx.interactive {
        Stdio::Inherit
    } else {
        Stdio::Captured
    };
    let options = ProcessOptions::new().cwd(dir).stdio(stdio);
    let args = command.args();

    tracing::debug!("{} {} in {}", DOCKER, args.join(" "), dir.display());
    match ctx.runner.run(DOCKER, &args, &options).await {
        Ok(output) if output.success() => {
            tracing::info!("{} {}", project.name, command.name());
            ExecutionResult::succeeded(&project.name, None).with_output(output.stdout)
        }
        Ok(output) => {
            let code = output
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            ExecutionResult::failed(
                &project.name,
                format!(
                    "docker compose {} failed in {} with exit code {}",
                    command.name(),
                    project.name,
                    code
                ),
            )
            .with_output(output.stderr)
        }
        Err(e) => ExecutionResult::failed(&project.name, e.to_string()),
    }
}
