//! Custom commands and hooks

use super::executor::{
    run_command, AggregateResult, ExecutionOptions, ExecutionResult, Operation, OperationExecutor,
    ProjectTask, TaskContext,
};
use super::target::TargetSelector;
use crate::error::{DockyardError, Result};
use crate::project::{OperationSpec, Project, ProjectRegistry, TargetSpec};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Overrides for a command or hook run; `None` keeps the definition's value
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    /// Replace the default target
    pub target: Option<TargetSpec>,
    /// Force parallel or sequential
    pub parallel: Option<bool>,
    /// Keep going after failures in sequential mode
    pub continue_on_error: bool,
}

/// Run a custom command from the registry
pub async fn run_custom_command(
    registry: &dyn ProjectRegistry,
    executor: &OperationExecutor,
    name: &str,
    overrides: &RunOverrides,
) -> Result<AggregateResult> {
    let spec = registry
        .custom_commands()
        .get(name)
        .ok_or_else(|| DockyardError::CommandNotFound(name.to_string()))?;

    let target = overrides.target.as_ref().unwrap_or(&spec.target);
    let targets = TargetSelector::select(registry.projects(), Some(target), registry.groups());

    let options = ExecutionOptions::new()
        .parallel(overrides.parallel.unwrap_or(spec.parallel))
        .continue_on_error(overrides.continue_on_error)
        .interactive(spec.interactive);

    Ok(executor
        .run(&targets, &Operation::Command(spec.clone()), &options)
        .await)
}

/// Hook resolved for each project of a run
struct HookTask {
    name: String,
    specs: HashMap<String, OperationSpec>,
}

#[async_trait]
impl ProjectTask for HookTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, project: &Project, ctx: &TaskContext<'_>) -> ExecutionResult {
        match self.specs.get(&project.name) {
            Some(spec) => run_command(ctx, project, spec).await,
            None => ExecutionResult::failed(
                &project.name,
                DockyardError::Internal(format!(
                    "{} hook was not resolved for {}",
                    self.name, project.name
                ))
                .to_string(),
            ),
        }
    }
}

/// Run a hook on the selected projects
///
/// Each project uses its own hook, else the global hook, else the custom
/// command of the same name. Projects with none of these are left out; when
/// no project has the hook nothing runs and the result is empty.
pub async fn run_hook(
    registry: &dyn ProjectRegistry,
    executor: &OperationExecutor,
    name: &str,
    overrides: &RunOverrides,
) -> AggregateResult {
    let default_target = registry
        .global_hooks()
        .get(name)
        .or_else(|| registry.custom_commands().get(name))
        .map(|spec| spec.target.clone())
        .unwrap_or_default();
    let target = overrides.target.as_ref().unwrap_or(&default_target);
    let selected = TargetSelector::select(registry.projects(), Some(target), registry.groups());

    let mut specs = HashMap::new();
    let mut targets = Vec::new();
    for project in selected {
        match registry.resolve_hook(&project, name) {
            Some(spec) => {
                specs.insert(project.name.clone(), spec.clone());
                targets.push(project);
            }
            None => tracing::debug!("{} has no {} hook", project.name, name),
        }
    }

    if targets.is_empty() {
        tracing::info!("No project defines hook {}", name);
        return AggregateResult::empty();
    }

    let first = &specs[&targets[0].name];
    let options = ExecutionOptions::new()
        .parallel(overrides.parallel.unwrap_or(first.parallel))
        .continue_on_error(overrides.continue_on_error)
        .interactive(specs.values().any(|s| s.interactive));

    let task = HookTask {
        name: name.to_string(),
        specs,
    };
    executor
        .run(&targets, &Operation::Task(Arc::new(task)), &options)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::ScriptedRunner;
    use crate::project::{Workspace, WorkspaceConfig};
    use std::path::PathBuf;

    fn workspace() -> Workspace {
        let mut config = WorkspaceConfig::default();
        config.projects = vec![
            Project::new("db", "db"),
            Project::new("api", "api").hook("seed", OperationSpec::new("", "./seed-api.sh ${PROJECT_NAME}")),
            Project::new("web", "web").hook("build", OperationSpec::new("", "npm run build")),
        ];
        config.groups.insert(
            "backend".to_string(),
            vec!["db".to_string(), "api".to_string()],
        );
        config.commands.insert(
            "ps".to_string(),
            OperationSpec::new("ps", "docker compose ps").target(TargetSpec::from("backend")),
        );
        Workspace::new(PathBuf::from("/ws"), config)
    }

    #[tokio::test]
    async fn test_custom_command_default_target() {
        let runner = Arc::new(ScriptedRunner::succeeding());
        let executor = OperationExecutor::new(runner.clone(), PathBuf::from("/ws"));
        let ws = workspace();

        let aggregate = run_custom_command(&ws, &executor, "ps", &RunOverrides::default())
            .await
            .unwrap();

        assert!(aggregate.success);
        let dirs: Vec<_> = runner.calls().into_iter().filter_map(|c| c.cwd).collect();
        assert_eq!(dirs, vec![PathBuf::from("/ws/db"), PathBuf::from("/ws/api")]);
    }

    #[tokio::test]
    async fn test_custom_command_target_override() {
        let runner = Arc::new(ScriptedRunner::succeeding());
        let executor = OperationExecutor::new(runner.clone(), PathBuf::from("/ws"));
        let overrides = RunOverrides {
            target: Some(TargetSpec::from("web")),
            ..Default::default()
        };

        run_custom_command(&workspace(), &executor, "ps", &overrides)
            .await
            .unwrap();
        assert_eq!(runner.count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_custom_command() {
        let runner = Arc::new(ScriptedRunner::succeeding());
        let executor = OperationExecutor::new(runner, PathBuf::from("/ws"));
        let result = run_custom_command(&workspace(), &executor, "deploy", &RunOverrides::default()).await;
        assert!(matches!(result, Err(DockyardError::CommandNotFound(_))));
    }

    #[tokio::test]
    async fn test_hook_only_runs_where_defined() {
        let runner = Arc::new(ScriptedRunner::succeeding());
        let executor = OperationExecutor::new(runner.clone(), PathBuf::from("/ws"));

        let aggregate = run_hook(&workspace(), &executor, "seed", &RunOverrides::default()).await;

        assert!(aggregate.success);
        assert_eq!(aggregate.results.len(), 1);
        assert_eq!(aggregate.results[0].project, "api");
        assert_eq!(runner.command_lines(), vec!["./seed-api.sh api"]);
    }

    #[tokio::test]
    async fn test_missing_hook_runs_nothing() {
        let runner = Arc::new(ScriptedRunner::succeeding());
        let executor = OperationExecutor::new(runner.clone(), PathBuf::from("/ws"));

        let aggregate = run_hook(&workspace(), &executor, "teardown", &RunOverrides::default()).await;

        assert!(aggregate.success);
        assert!(aggregate.results.is_empty());
        assert_eq!(runner.count(), 0);
    }

    #[tokio::test]
    async fn test_unresolved_hook_target_fails() {
        let runner = Arc::new(ScriptedRunner::succeeding());
        let executor = OperationExecutor::new(runner.clone(), PathBuf::from("/ws"));
        let task = HookTask {
            name: "seed".to_string(),
            specs: HashMap::new(),
        };

        let aggregate = executor
            .run(
                &[Project::new("db", "db")],
                &Operation::Task(Arc::new(task)),
                &ExecutionOptions::new(),
            )
            .await;

        assert!(!aggregate.success);
        assert_eq!(
            aggregate.results[0].error.as_deref(),
            Some("Internal error: seed hook was not resolved for db")
        );
        assert_eq!(runner.count(), 0);
    }

    #[tokio::test]
    async fn test_hook_falls_back_to_custom_command() {
        let runner = Arc::new(ScriptedRunner::succeeding());
        let executor = OperationExecutor::new(runner.clone(), PathBuf::from("/ws"));
        let overrides = RunOverrides {
            target: Some(TargetSpec::all()),
            ..Default::default()
        };

        let aggregate = run_hook(&workspace(), &executor, "ps", &overrides).await;

        assert_eq!(aggregate.results.len(), 3);
        assert!(runner.command_lines().iter().all(|l| l == "docker compose ps"));
    }
}
