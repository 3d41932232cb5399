//! Workspace file parser

use super::config::{TargetSpec, WorkspaceConfig, ALL_TARGET};
use crate::error::{DockyardError, Result};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Default workspace file names
pub const DEFAULT_WORKSPACE_FILES: &[&str] = &["dockyard.yaml", "dockyard.yml", ".dockyard.yaml"];

/// Workspace file parser
pub struct WorkspaceParser;

impl WorkspaceParser {
    /// Find a workspace file in a directory
    pub fn find_workspace_file(dir: &Path) -> Option<PathBuf> {
        for name in DEFAULT_WORKSPACE_FILES {
            let path = dir.join(name);
            if path.exists() {
                return Some(path);
            }
        }
        None
    }

    /// Find a workspace file in `start` or any of its ancestors, then in the
    /// user config directory
    pub fn discover(start: &Path) -> Option<PathBuf> {
        for dir in start.ancestors() {
            if let Some(path) = Self::find_workspace_file(dir) {
                return Some(path);
            }
        }

        dirs::config_dir()
            .map(|d| d.join("dockyard"))
            .and_then(|d| Self::find_workspace_file(&d))
    }

    /// Parse a workspace file from path
    pub fn parse_file(path: &Path) -> Result<WorkspaceConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DockyardError::WorkspaceParse(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::parse_str(&content)
    }

    /// Parse a workspace file from string
    pub fn parse_str(content: &str) -> Result<WorkspaceConfig> {
        let mut config: WorkspaceConfig = serde_yaml::from_str(content)
            .map_err(|e| DockyardError::WorkspaceParse(format!("Failed to parse YAML: {}", e)))?;

        // Operation names come from their map keys
        for (name, spec) in config.hooks.iter_mut().chain(config.commands.iter_mut()) {
            if spec.name.is_empty() {
                spec.name = name.clone();
            }
        }
        for project in &mut config.projects {
            for (name, spec) in project.hooks.iter_mut() {
                if spec.name.is_empty() {
                    spec.name = name.clone();
                }
            }
        }

        Ok(config)
    }

    /// Validate a workspace, returning warnings for dangling references
    ///
    /// Duplicate project names are the only hard error; everything else
    /// degrades gracefully at run time.
    pub fn validate(config: &WorkspaceConfig) -> Result<Vec<String>> {
        let mut warnings = Vec::new();
        let mut names = HashSet::new();

        for project in &config.projects {
            if !names.insert(project.name.as_str()) {
                return Err(DockyardError::InvalidConfig(format!(
                    "Project '{}' is declared more than once",
                    project.name
                )));
            }
        }

        let mut dependents: Vec<_> = config.dependencies.iter().collect();
        dependents.sort_by(|a, b| a.0.cmp(b.0));
        for (project, deps) in dependents {
            if !names.contains(project.as_str()) {
                warnings.push(format!(
                    "Dependencies declared for unknown project '{}'",
                    project
                ));
            }
            for dep in deps {
                if !names.contains(dep.as_str()) {
                    warnings.push(format!(
                        "Project '{}' depends on unknown project '{}' (ignored)",
                        project, dep
                    ));
                }
            }
        }

        let mut groups: Vec<_> = config.groups.iter().collect();
        groups.sort_by(|a, b| a.0.cmp(b.0));
        for (group, members) in groups {
            if names.contains(group.as_str()) {
                warnings.push(format!(
                    "Group '{}' shadows a project of the same name",
                    group
                ));
            }
            for member in members {
                if !names.contains(member.as_str()) {
                    warnings.push(format!(
                        "Group '{}' references unknown project '{}' (skipped)",
                        group, member
                    ));
                }
            }
        }

        let mut environments: Vec<_> = config.environments.iter().collect();
        environments.sort_by(|a, b| a.0.cmp(b.0));
        for (environment, target) in environments {
            for entry in Self::unknown_targets(config, target, &names) {
                warnings.push(format!(
                    "Environment '{}' targets unknown project or group '{}'",
                    environment, entry
                ));
            }
        }

        Ok(warnings)
    }

    fn unknown_targets(
        config: &WorkspaceConfig,
        target: &TargetSpec,
        names: &HashSet<&str>,
    ) -> Vec<String> {
        target
            .entries()
            .into_iter()
            .filter(|e| *e != ALL_TARGET && !names.contains(e) && !config.groups.contains_key(*e))
            .map(String::from)
            .collect()
    }

    /// Interpolate environment variables into operation environments
    pub fn interpolate(config: &mut WorkspaceConfig, env: &HashMap<String, String>) {
        let global = config.hooks.values_mut().chain(config.commands.values_mut());
        for spec in global {
            for value in spec.env.values_mut() {
                *value = interpolate_string(value, env);
            }
        }

        for project in &mut config.projects {
            for spec in project.hooks.values_mut() {
                for value in spec.env.values_mut() {
                    *value = interpolate_string(value, env);
                }
            }
        }
    }
}

fn variable_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| match Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}") {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!("Variable interpolation disabled: {}", e);
                None
            }
        })
        .as_ref()
}

/// Interpolate `${VAR}` and `${VAR:-default}` in a string
///
/// Unknown variables without a default are left untouched.
pub fn interpolate_string(s: &str, env: &HashMap<String, String>) -> String {
    let Some(pattern) = variable_pattern() else {
        return s.to_string();
    };
    pattern
        .replace_all(s, |caps: &regex::Captures| {
            let var = &caps[1];
            match (env.get(var), caps.get(2)) {
                (Some(value), _) => value.clone(),
                (None, Some(default)) => default.as_str().to_string(),
                (None, None) => caps[0].to_string(),
            }
        })
        .into_owned()
}
