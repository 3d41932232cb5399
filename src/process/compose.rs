//! `docker compose` adapter

use crate::error::{DockyardError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Executable used for compose commands
pub const DOCKER: &str = "docker";

/// Default compose file names
pub const DEFAULT_COMPOSE_FILES: &[&str] = &[
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

/// Find the compose file of a project directory
pub fn find_compose_file(dir: &Path) -> Option<PathBuf> {
    for name in DEFAULT_COMPOSE_FILES {
        let path = dir.join(name);
        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// A `docker compose` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeCommand {
    /// Create and start containers in the background
    Up,
    /// Stop and remove containers
    Down,
    /// Status of one service as JSON
    Ps { service: String },
}

impl ComposeCommand {
    /// Short name for logs and messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Ps { .. } => "ps",
        }
    }

    /// Arguments passed to `docker`
    pub fn args(&self) -> Vec<String> {
        let args: Vec<&str> = match self {
            Self::Up => vec!["compose", "up", "-d"],
            Self::Down => vec!["compose", "down"],
            Self::Ps { service } => vec!["compose", "ps", "--format", "json", service.as_str()],
        };
        args.into_iter().map(String::from).collect()
    }
}

/// One container entry of `docker compose ps --format json`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceStatus {
    /// Service name
    #[serde(rename = "Service", default)]
    pub service: String,
    /// Container state (`running`, `exited`, ...)
    #[serde(rename = "State")]
    pub state: String,
    /// Health status; empty when the service has no healthcheck
    #[serde(rename = "Health", default)]
    pub health: Option<String>,
}

impl ServiceStatus {
    /// Running, and healthy if a healthcheck is defined
    pub fn is_ready(&self) -> bool {
        let healthy = match self.health.as_deref() {
            None | Some("") => true,
            Some(health) => health == "healthy",
        };
        self.state == "running" && healthy
    }
}

/// Parse `docker compose ps --format json` output
///
/// Older compose releases print a JSON array, newer ones one object per line.
pub fn parse_ps_output(output: &str) -> Result<Vec<ServiceStatus>> {
    let trimmed = output.trim();

    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    trimmed
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|e| DockyardError::Process(format!("Invalid compose status: {}", e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_find_compose_file() {
        let temp = tempdir().unwrap();
        assert!(find_compose_file(temp.path()).is_none());

        std::fs::write(temp.path().join("docker-compose.yml"), "services: {}\n").unwrap();
        assert_eq!(
            find_compose_file(temp.path()),
            Some(temp.path().join("docker-compose.yml"))
        );

        std::fs::write(temp.path().join("compose.yaml"), "services: {}\n").unwrap();
        assert_eq!(
            find_compose_file(temp.path()),
            Some(temp.path().join("compose.yaml"))
        );
    }

    #[test]
    fn test_compose_args() {
        assert_eq!(ComposeCommand::Up.args(), vec!["compose", "up", "-d"]);
        assert_eq!(
            ComposeCommand::Ps { service: "db".to_string() }.args(),
            vec!["compose", "ps", "--format", "json", "db"]
        );
    }

    #[test]
    fn test_parse_ps_array() {
        let out = r#"[{"Service":"db","State":"running","Health":"healthy"}]"#;
        let statuses = parse_ps_output(out).unwrap();
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].is_ready());
    }

    #[test]
    fn test_parse_ps_lines() {
        let out = concat!(
            r#"{"Service":"db","State":"running","Health":""}"#,
            "\n",
            r#"{"Service":"db","State":"running","Health":"starting"}"#,
            "\n"
        );
        let statuses = parse_ps_output(out).unwrap();
        assert_eq!(statuses.len(), 2);
        assert!(statuses[0].is_ready());
        assert!(!statuses[1].is_ready());
    }

    #[test]
    fn test_parse_ps_garbage() {
        assert!(parse_ps_output("no such service: db").is_err());
        assert!(parse_ps_output("").unwrap().is_empty());
    }
}
