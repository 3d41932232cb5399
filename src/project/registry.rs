//! Read-only project registry

use super::config::{
    DependencyMap, GroupMap, OperationMap, OperationSpec, Project, Settings, TargetSpec,
    WorkspaceConfig,
};
use super::parser::WorkspaceParser;
use crate::error::{DockyardError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Source of projects, dependencies, groups and operation definitions
///
/// The orchestration core only reads from a registry; it never persists
/// configuration.
pub trait ProjectRegistry: Send + Sync {
    /// Root directory that project paths are relative to
    fn root(&self) -> &Path;

    /// Projects in declaration order
    fn projects(&self) -> &[Project];

    /// Dependency map
    fn dependencies(&self) -> &DependencyMap;

    /// Named groups
    fn groups(&self) -> &GroupMap;

    /// Global hooks
    fn global_hooks(&self) -> &OperationMap;

    /// Custom commands
    fn custom_commands(&self) -> &OperationMap;

    /// Target of a named environment
    fn environment(&self, name: &str) -> Option<&TargetSpec>;

    /// Workspace settings
    fn settings(&self) -> &Settings;

    /// Look up a project by name
    fn project(&self, name: &str) -> Option<&Project> {
        self.projects().iter().find(|p| p.name == name)
    }

    /// Resolve a hook for a project: project hook, then global hook, then
    /// custom command of the same name
    fn resolve_hook<'a>(&'a self, project: &'a Project, name: &str) -> Option<&'a OperationSpec> {
        project
            .hooks
            .get(name)
            .or_else(|| self.global_hooks().get(name))
            .or_else(|| self.custom_commands().get(name))
    }
}

/// Registry backed by a workspace file
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Root directory
    root: PathBuf,
    /// Parsed configuration
    config: WorkspaceConfig,
}

impl Workspace {
    /// Create a workspace from an already parsed configuration
    pub fn new(root: PathBuf, config: WorkspaceConfig) -> Self {
        Self { root, config }
    }

    /// Load a workspace file, interpolating the ambient environment
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = WorkspaceParser::parse_file(path)?;

        for warning in WorkspaceParser::validate(&config)? {
            tracing::warn!("{}", warning);
        }

        let env: HashMap<String, String> = std::env::vars().collect();
        WorkspaceParser::interpolate(&mut config, &env);

        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        tracing::debug!(
            "Loaded workspace {} with {} projects",
            path.display(),
            config.projects.len()
        );

        Ok(Self::new(root, config))
    }

    /// Load the workspace at `path`, or discover one from `start`
    pub fn open(path: Option<&Path>, start: &Path) -> Result<Self> {
        let file = match path {
            Some(p) => p.to_path_buf(),
            None => WorkspaceParser::discover(start).ok_or_else(|| {
                DockyardError::WorkspaceNotFound(format!(
                    "no dockyard.yaml in {} or its parents",
                    start.display()
                ))
            })?,
        };

        if !file.exists() {
            return Err(DockyardError::WorkspaceNotFound(file.display().to_string()));
        }

        Self::load(&file)
    }

    /// Workspace name
    pub fn name(&self) -> Option<&str> {
        self.config.name.as_deref()
    }

    /// Parsed configuration
    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }
}

impl ProjectRegistry for Workspace {
    fn root(&self) -> &Path {
        &self.root
    }

    fn projects(&self) -> &[Project] {
        &self.config.projects
    }

    fn dependencies(&self) -> &DependencyMap {
        &self.config.dependencies
    }

    fn groups(&self) -> &GroupMap {
        &self.config.groups
    }

    fn global_hooks(&self) -> &OperationMap {
        &self.config.hooks
    }

    fn custom_commands(&self) -> &OperationMap {
        &self.config.commands
    }

    fn environment(&self, name: &str) -> Option<&TargetSpec> {
        self.config.environments.get(name)
    }

    fn settings(&self) -> &Settings {
        &self.config.settings
    }
}
