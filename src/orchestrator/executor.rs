//! Operation execution across projects
//!
//! One executor serves custom commands, hooks, git operations and the
//! up/down lifecycle: targets are run one at a time or all at once and the
//! per-project outcomes are gathered into an [`AggregateResult`].

use crate::error::{DockyardError, Result};
use crate::process::{ProcessOptions, ProcessRunner, Stdio};
use crate::project::{OperationSpec, Project};
use async_trait::async_trait;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Placeholder replaced by the project name
pub const PROJECT_NAME_VAR: &str = "${PROJECT_NAME}";

/// Placeholder replaced by the project directory
pub const PROJECT_PATH_VAR: &str = "${PROJECT_PATH}";

/// Outcome of one operation on one project
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Project name
    pub project: String,
    /// Whether the unit succeeded
    pub success: bool,
    /// Captured output
    pub output: Option<String>,
    /// Error message or captured stderr
    pub error: Option<String>,
    /// Reason the unit was skipped (still a success)
    pub skipped: Option<String>,
}

impl ExecutionResult {
    /// Successful unit
    pub fn succeeded(project: &str, output: Option<String>) -> Self {
        Self {
            project: project.to_string(),
            success: true,
            output,
            ..Default::default()
        }
    }

    /// Failed unit
    pub fn failed(project: &str, error: impl Into<String>) -> Self {
        Self {
            project: project.to_string(),
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Unit that deliberately did nothing
    pub fn skipped(project: &str, reason: impl Into<String>) -> Self {
        Self {
            project: project.to_string(),
            success: true,
            skipped: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Attach captured output
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        let output = output.into();
        if !output.is_empty() {
            self.output = Some(output);
        }
        self
    }
}

/// Combined outcome of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateResult {
    /// True iff every attempted unit succeeded
    pub success: bool,
    /// Per-project outcomes in completion-report order
    pub results: Vec<ExecutionResult>,
    /// Project at which a fail-fast sequential run stopped
    pub aborted: Option<String>,
}

impl Default for AggregateResult {
    fn default() -> Self {
        Self::empty()
    }
}

impl AggregateResult {
    /// Nothing to do
    pub fn empty() -> Self {
        Self {
            success: true,
            results: Vec::new(),
            aborted: None,
        }
    }

    /// Aggregate a complete set of results
    pub fn from_results(results: Vec<ExecutionResult>) -> Self {
        Self {
            success: results.iter().all(|r| r.success),
            results,
            aborted: None,
        }
    }

    /// Failed units
    pub fn failed(&self) -> Vec<&ExecutionResult> {
        self.results.iter().filter(|r| !r.success).collect()
    }

    /// Skipped units
    pub fn skipped(&self) -> Vec<&ExecutionResult> {
        self.results.iter().filter(|r| r.skipped.is_some()).collect()
    }

    /// Turn a fail-fast abort into an error
    pub fn into_result(self) -> Result<Self> {
        match self.aborted {
            Some(ref project) => {
                let message = self
                    .results
                    .iter()
                    .rev()
                    .find(|r| &r.project == project && !r.success)
                    .and_then(|r| r.error.clone())
                    .unwrap_or_else(|| "failed".to_string());
                Err(DockyardError::OperationAborted {
                    project: project.clone(),
                    message,
                })
            }
            None => Ok(self),
        }
    }
}

/// How an executor run is scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Run every target concurrently
    pub parallel: bool,
    /// Keep going after a failure in sequential mode
    pub continue_on_error: bool,
    /// Children share the terminal; forces sequential execution
    pub interactive: bool,
}

impl ExecutionOptions {
    /// Sequential, fail-fast, captured
    pub fn new() -> Self {
        Self::default()
    }

    /// Set parallel execution
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set continue-on-error
    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Set interactive mode
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }
}

/// What a [`ProjectTask`] gets to work with
pub struct TaskContext<'a> {
    /// Process runner
    pub runner: &'a dyn ProcessRunner,
    /// Workspace root
    pub root: &'a Path,
    /// Whether children should share the terminal
    pub interactive: bool,
}

/// A unit of work that is not a plain command template
#[async_trait]
pub trait ProjectTask: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Run against one project; failures are reported in the result
    async fn run(&self, project: &Project, ctx: &TaskContext<'_>) -> ExecutionResult;
}

/// Operation handed to the executor
#[derive(Clone)]
pub enum Operation {
    /// Command template
    Command(OperationSpec),
    /// Custom task
    Task(Arc<dyn ProjectTask>),
}

impl Operation {
    /// Operation name
    pub fn name(&self) -> &str {
        match self {
            Self::Command(spec) => &spec.name,
            Self::Task(task) => task.name(),
        }
    }

    fn is_interactive(&self) -> bool {
        matches!(self, Self::Command(spec) if spec.interactive)
    }
}

impl From<OperationSpec> for Operation {
    fn from(spec: OperationSpec) -> Self {
        Self::Command(spec)
    }
}

/// Runs operations against projects
pub struct OperationExecutor {
    /// Process runner
    runner: Arc<dyn ProcessRunner>,
    /// Workspace root
    root: PathBuf,
}

impl OperationExecutor {
    /// Create a new executor
    pub fn new(runner: Arc<dyn ProcessRunner>, root: PathBuf) -> Self {
        Self { runner, root }
    }

    /// Workspace root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Process runner
    pub fn runner(&self) -> &Arc<dyn ProcessRunner> {
        &self.runner
    }

    /// Run `op` against every target
    ///
    /// In parallel mode all units start at once and every result is
    /// collected. In sequential mode units run in target order; without
    /// `continue_on_error` the first failure stops the run and is recorded in
    /// [`AggregateResult::aborted`].
    pub async fn run(
        &self,
        targets: &[Project],
        op: &Operation,
        options: &ExecutionOptions,
    ) -> AggregateResult {
        if targets.is_empty() {
            tracing::info!("No projects selected for {}, nothing to do", op.name());
            return AggregateResult::empty();
        }

        let interactive = options.interactive || op.is_interactive();
        let parallel = options.parallel && !interactive;
        if options.parallel && interactive {
            tracing::warn!(
                "{} is interactive, running sequentially instead of in parallel",
                op.name()
            );
        }

        tracing::info!(
            "Running {} on {} project(s) ({})",
            op.name(),
            targets.len(),
            if parallel { "parallel" } else { "sequential" }
        );

        if parallel {
            let units = targets.iter().map(|p| self.run_one(p, op, interactive));
            let aggregate = AggregateResult::from_results(join_all(units).await);
            for result in aggregate.failed() {
                log_failure(op.name(), result);
            }
            return aggregate;
        }

        let mut results = Vec::with_capacity(targets.len());
        for project in targets {
            let result = self.run_one(project, op, interactive).await;
            let failed = !result.success;
            if failed {
                log_failure(op.name(), &result);
            }
            results.push(result);

            if failed && !options.continue_on_error {
                tracing::error!("Stopping {} after failure in {}", op.name(), project.name);
                return AggregateResult {
                    success: false,
                    results,
                    aborted: Some(project.name.clone()),
                };
            }
        }

        AggregateResult::from_results(results)
    }

    async fn run_one(&self, project: &Project, op: &Operation, interactive: bool) -> ExecutionResult {
        let ctx = TaskContext {
            runner: self.runner.as_ref(),
            root: &self.root,
            interactive,
        };

        match op {
            Operation::Command(spec) => run_command(&ctx, project, spec).await,
            Operation::Task(task) => task.run(project, &ctx).await,
        }
    }
}

fn log_failure(op: &str, result: &ExecutionResult) {
    tracing::error!(
        "{} failed in {}: {}",
        op,
        result.project,
        result.error.as_deref().unwrap_or("unknown error")
    );
}

/// Substitute the project placeholders in a command template
pub fn render_command(template: &str, project: &Project, dir: &Path) -> String {
    template
        .replace(PROJECT_NAME_VAR, &project.name)
        .replace(PROJECT_PATH_VAR, &dir.to_string_lossy())
}

/// Split a command on whitespace
///
/// Quotes are not interpreted: `echo "a b"` yields `echo`, `"a`, `b"`.
pub fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(String::from).collect()
}

/// Run a command template in a project's directory
pub async fn run_command(ctx: &TaskContext<'_>, project: &Project, spec: &OperationSpec) -> ExecutionResult {
    let dir = project.directory(ctx.root);
    let command = render_command(&spec.command, project, &dir);
    let mut parts = split_command(&command).into_iter();

    let Some(program) = parts.next() else {
        return ExecutionResult::failed(
            &project.name,
            format!("Command \"{}\" is empty", spec.name),
        );
    };
    let args: Vec<String> = parts.collect();

    let stdio = if ctx.interactive || spec.interactive {
        Stdio::Inherit
    } else {
        Stdio::Captured
    };
    let options = ProcessOptions::new().cwd(&dir).envs(&spec.env).stdio(stdio);

    match ctx.runner.run(&program, &args, &options).await {
        Ok(output) if output.success() => {
            let mut result = ExecutionResult::succeeded(&project.name, None).with_output(output.stdout);
            if !output.stderr.is_empty() {
                result.error = Some(output.stderr);
            }
            result
        }
        Ok(output) => {
            let code = output
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let captured = [output.stdout.as_str(), output.stderr.as_str()]
                .iter()
                .filter(|s| !s.is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join("\n");
            ExecutionResult::failed(
                &project.name,
                format!(
                    "Command \"{}\" failed in {} with exit code {}",
                    spec.name, project.name, code
                ),
            )
            .with_output(captured)
        }
        Err(e) => ExecutionResult::failed(&project.name, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::ScriptedRunner;
    use crate::process::ProcessOutput;
    use std::time::{Duration, Instant};

    fn projects(names: &[&str]) -> Vec<Project> {
        names.iter().map(|n| Project::new(n, n)).collect()
    }

    fn executor(runner: Arc<ScriptedRunner>) -> OperationExecutor {
        OperationExecutor::new(runner, PathBuf::from("/ws"))
    }

    /// Fails for any call whose working directory ends in `name`
    fn failing_in(name: &'static str) -> ScriptedRunner {
        ScriptedRunner::new(move |call| {
            let dir = call.cwd.clone().unwrap_or_default();
            if dir.ends_with(name) {
                Ok(ProcessOutput::exited(2, "", "boom"))
            } else {
                Ok(ProcessOutput::exited(0, "ok\n", ""))
            }
        })
    }

    #[tokio::test]
    async fn test_empty_targets() {
        let runner = Arc::new(ScriptedRunner::succeeding());
        let op = Operation::from(OperationSpec::new("noop", "true"));
        let aggregate = executor(runner.clone())
            .run(&[], &op, &ExecutionOptions::new())
            .await;

        assert!(aggregate.success);
        assert!(aggregate.results.is_empty());
        assert_eq!(runner.count(), 0);
    }

    #[tokio::test]
    async fn test_template_and_naive_split() {
        let runner = Arc::new(ScriptedRunner::succeeding());
        let spec = OperationSpec::new("greet", "echo ${PROJECT_NAME} \"test\" ${PROJECT_PATH}")
            .env("GREETING", "hi");
        let aggregate = executor(runner.clone())
            .run(&projects(&["api"]), &spec.into(), &ExecutionOptions::new())
            .await;

        assert!(aggregate.success);
        let calls = runner.calls();
        assert_eq!(calls[0].program, "echo");
        assert_eq!(calls[0].args, vec!["api", "\"test\"", "/ws/api"]);
        assert_eq!(calls[0].cwd, Some(PathBuf::from("/ws/api")));
        assert_eq!(calls[0].env.get("GREETING").map(String::as_str), Some("hi"));
        assert_eq!(calls[0].stdio, Stdio::Captured);
    }

    #[tokio::test]
    async fn test_sequential_stops_on_failure() {
        let runner = Arc::new(failing_in("b"));
        let op = Operation::from(OperationSpec::new("build", "make build"));
        let aggregate = executor(runner.clone())
            .run(&projects(&["a", "b", "c"]), &op, &ExecutionOptions::new())
            .await;

        assert!(!aggregate.success);
        assert_eq!(aggregate.results.len(), 2);
        assert_eq!(aggregate.aborted.as_deref(), Some("b"));
        assert_eq!(runner.count(), 2);
        assert_eq!(
            aggregate.results[1].error.as_deref(),
            Some("Command \"build\" failed in b with exit code 2")
        );
        assert_eq!(aggregate.results[1].output.as_deref(), Some("boom"));

        match aggregate.into_result() {
            Err(DockyardError::OperationAborted { project, message }) => {
                assert_eq!(project, "b");
                assert!(message.contains("exit code 2"));
            }
            other => panic!("expected abort, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sequential_continue_on_error() {
        let runner = Arc::new(failing_in("b"));
        let op = Operation::from(OperationSpec::new("build", "make build"));
        let options = ExecutionOptions::new().continue_on_error(true);
        let aggregate = executor(runner.clone())
            .run(&projects(&["a", "b", "c"]), &op, &options)
            .await;

        assert!(!aggregate.success);
        assert_eq!(aggregate.results.len(), 3);
        assert!(aggregate.aborted.is_none());
        assert_eq!(aggregate.failed().len(), 1);
        assert!(aggregate.results[2].success);
        assert_eq!(aggregate.results[2].output.as_deref(), Some("ok\n"));
    }

    #[tokio::test]
    async fn test_parallel_collects_all() {
        let runner = Arc::new(failing_in("bad"));
        let op = Operation::from(OperationSpec::new("check", "make check"));
        let options = ExecutionOptions::new().parallel(true);
        let aggregate = executor(runner)
            .run(&projects(&["bad", "good"]), &op, &options)
            .await;

        assert!(!aggregate.success);
        assert_eq!(aggregate.results.len(), 2);
        assert!(!aggregate.results[0].success);
        assert!(aggregate.results[1].success);
        assert!(aggregate.aborted.is_none());
    }

    #[tokio::test]
    async fn test_parallel_runs_concurrently() {
        let runner = Arc::new(ScriptedRunner::succeeding().with_delay(Duration::from_millis(300)));
        let op = Operation::from(OperationSpec::new("slow", "sleep 1"));
        let options = ExecutionOptions::new().parallel(true);

        let started = Instant::now();
        let aggregate = executor(runner)
            .run(&projects(&["a", "b", "c", "d"]), &op, &options)
            .await;

        assert!(aggregate.success);
        assert!(started.elapsed() < Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_duplicate_targets_run_twice() {
        let runner = Arc::new(ScriptedRunner::succeeding());
        let op = Operation::from(OperationSpec::new("ping", "true"));
        let targets = projects(&["a", "a"]);
        let aggregate = executor(runner.clone())
            .run(&targets, &op, &ExecutionOptions::new())
            .await;

        assert_eq!(aggregate.results.len(), 2);
        assert_eq!(runner.count(), 2);
    }

    #[tokio::test]
    async fn test_spawn_error_message() {
        let runner = Arc::new(ScriptedRunner::new(|_| {
            Err(DockyardError::Process("nope: No such file or directory".to_string()))
        }));
        let op = Operation::from(OperationSpec::new("x", "nope"));
        let aggregate = executor(runner)
            .run(&projects(&["a"]), &op, &ExecutionOptions::new())
            .await;

        assert!(!aggregate.success);
        assert!(aggregate.results[0]
            .error
            .as_deref()
            .unwrap()
            .contains("No such file or directory"));
    }

    #[tokio::test]
    async fn test_interactive_inherits_and_runs_sequentially() {
        let runner = Arc::new(ScriptedRunner::succeeding().with_delay(Duration::from_millis(100)));
        let spec = OperationSpec::new("shell", "bash").interactive(true);
        let options = ExecutionOptions::new().parallel(true);

        let started = Instant::now();
        let aggregate = executor(runner.clone())
            .run(&projects(&["a", "b"]), &spec.into(), &options)
            .await;

        assert!(aggregate.success);
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(runner.calls().iter().all(|c| c.stdio == Stdio::Inherit));
    }

    struct Named;

    #[async_trait]
    impl ProjectTask for Named {
        fn name(&self) -> &str {
            "named"
        }

        async fn run(&self, project: &Project, ctx: &TaskContext<'_>) -> ExecutionResult {
            let dir = project.directory(ctx.root);
            ExecutionResult::succeeded(&project.name, Some(dir.display().to_string()))
        }
    }

    #[tokio::test]
    async fn test_task_operation() {
        let runner = Arc::new(ScriptedRunner::succeeding());
        let op = Operation::Task(Arc::new(Named));
        let aggregate = executor(runner.clone())
            .run(&projects(&["a"]), &op, &ExecutionOptions::new())
            .await;

        assert!(aggregate.success);
        assert_eq!(aggregate.results[0].output.as_deref(), Some("/ws/a"));
        assert_eq!(runner.count(), 0);
    }

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("  docker  compose up -d "), vec!["docker", "compose", "up", "-d"]);
        assert!(split_command("   ").is_empty());
    }
}
