//! Workspace configuration types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default probe timeout in milliseconds
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5000;

/// Default number of readiness rounds
pub const DEFAULT_MAX_RETRIES: u32 = 30;

/// Default delay between readiness rounds in milliseconds
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2000;

/// Default stabilization delay between starts in milliseconds
pub const DEFAULT_STARTUP_DELAY_MS: u64 = 2000;

/// Target name that selects every project
pub const ALL_TARGET: &str = "all";

/// Project name -> names of the projects it requires first
pub type DependencyMap = HashMap<String, Vec<String>>;

/// Group name -> member project names
pub type GroupMap = HashMap<String, Vec<String>>;

/// Operation name -> definition
pub type OperationMap = HashMap<String, OperationSpec>;

/// A single Compose project living in its own directory under the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Unique project name
    pub name: String,
    /// Path relative to the workspace root
    pub path: String,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Project-specific hooks
    #[serde(default)]
    pub hooks: OperationMap,
    /// Readiness check used by dependents
    #[serde(default)]
    pub readiness: Option<ReadinessSpec>,
}

impl Project {
    /// Create a new project
    pub fn new(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            description: None,
            hooks: HashMap::new(),
            readiness: None,
        }
    }

    /// Set the description
    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Set the readiness check
    pub fn readiness(mut self, readiness: ReadinessSpec) -> Self {
        self.readiness = Some(readiness);
        self
    }

    /// Add a project-specific hook
    pub fn hook(mut self, name: &str, mut spec: OperationSpec) -> Self {
        if spec.name.is_empty() {
            spec.name = name.to_string();
        }
        self.hooks.insert(name.to_string(), spec);
        self
    }

    /// Absolute directory of this project
    pub fn directory(&self, root: &Path) -> PathBuf {
        root.join(&self.path)
    }
}

/// Which projects an operation applies to
///
/// `all`, a project name, a group name, or a list mixing names and groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSpec {
    /// A single name (`all`, project or group)
    One(String),
    /// A list of names
    Many(Vec<String>),
}

impl Default for TargetSpec {
    fn default() -> Self {
        Self::all()
    }
}

impl TargetSpec {
    /// The `all` target
    pub fn all() -> Self {
        Self::One(ALL_TARGET.to_string())
    }

    /// Build a target from command-line names; empty means "not given"
    pub fn from_names(names: &[String]) -> Option<Self> {
        match names {
            [] => None,
            [single] => Some(Self::One(single.clone())),
            many => Some(Self::Many(many.to_vec())),
        }
    }

    /// Entries in spec order
    pub fn entries(&self) -> Vec<&str> {
        match self {
            Self::One(name) => vec![name.as_str()],
            Self::Many(names) => names.iter().map(|n| n.as_str()).collect(),
        }
    }

    /// Whether this target selects every project
    pub fn is_all(&self) -> bool {
        self.entries().contains(&ALL_TARGET)
    }
}

impl From<&str> for TargetSpec {
    fn from(name: &str) -> Self {
        Self::One(name.to_string())
    }
}

impl From<Vec<String>> for TargetSpec {
    fn from(names: Vec<String>) -> Self {
        Self::Many(names)
    }
}

impl From<Vec<&str>> for TargetSpec {
    fn from(names: Vec<&str>) -> Self {
        Self::Many(names.into_iter().map(String::from).collect())
    }
}

/// A command template run against each selected project
///
/// `${PROJECT_NAME}` and `${PROJECT_PATH}` are substituted per project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Operation name (filled from the map key when loaded)
    #[serde(default)]
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Command template
    pub command: String,
    /// Environment overlaid on the ambient environment
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Default target
    #[serde(default)]
    pub target: TargetSpec,
    /// Inherit the terminal instead of capturing output
    #[serde(default)]
    pub interactive: bool,
    /// Run against all targets concurrently
    #[serde(default)]
    pub parallel: bool,
}

impl OperationSpec {
    /// Create a new operation
    pub fn new(name: &str, command: &str) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
            ..Default::default()
        }
    }

    /// Add an environment variable
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    /// Set the default target
    pub fn target(mut self, target: TargetSpec) -> Self {
        self.target = target;
        self
    }

    /// Run concurrently
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Inherit the terminal
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }
}

/// How to verify that a project is usable, not merely started
///
/// `config` fields depend on the kind: `url` for `http`, `host`/`port` for
/// `port`, `command` for `command`, `service` for `docker`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessSpec {
    /// Probe kind (`http`, `port`, `command`, `docker`)
    #[serde(rename = "type")]
    pub kind: String,
    /// Kind-specific configuration
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
    /// Probe timeout in milliseconds
    #[serde(default, alias = "timeout")]
    pub timeout_ms: Option<u64>,
}

impl ReadinessSpec {
    /// Create a spec of the given kind with no configuration
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            config: HashMap::new(),
            timeout_ms: None,
        }
    }

    /// HTTP probe against `url`
    pub fn http(url: &str) -> Self {
        Self::new("http").with("url", url)
    }

    /// TCP probe against `host:port`
    pub fn port(host: &str, port: u16) -> Self {
        Self::new("port").with("host", host).with("port", port)
    }

    /// Command probe
    pub fn command(command: &str) -> Self {
        Self::new("command").with("command", command)
    }

    /// Compose service health probe
    pub fn docker(service: &str) -> Self {
        Self::new("docker").with("service", service)
    }

    /// Set a config field
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.config.insert(key.to_string(), value.into());
        self
    }

    /// Set the timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Effective timeout, falling back to `default_ms`
    pub fn timeout_or(&self, default_ms: u64) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(default_ms))
    }

    /// String config field
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }
}

/// Global retry settings for readiness waits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessPolicy {
    /// Rounds before giving up (the first round counts)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Sleep between rounds in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Probe timeout used when a spec has none, in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
        }
    }
}

impl ReadinessPolicy {
    /// Delay between rounds
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Workspace-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Readiness retry policy
    #[serde(default)]
    pub readiness: ReadinessPolicy,
    /// Delay after starting a project that has no readiness check
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            readiness: ReadinessPolicy::default(),
            startup_delay_ms: DEFAULT_STARTUP_DELAY_MS,
        }
    }
}

impl Settings {
    /// Stabilization delay between starts
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

fn default_startup_delay_ms() -> u64 {
    DEFAULT_STARTUP_DELAY_MS
}

/// On-disk workspace file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Workspace name
    #[serde(default)]
    pub name: Option<String>,
    /// Projects in declaration order
    #[serde(default)]
    pub projects: Vec<Project>,
    /// Dependency map
    #[serde(default)]
    pub dependencies: DependencyMap,
    /// Named groups
    #[serde(default)]
    pub groups: GroupMap,
    /// Global hooks
    #[serde(default)]
    pub hooks: OperationMap,
    /// Custom commands
    #[serde(default)]
    pub commands: OperationMap,
    /// Named environments
    #[serde(default)]
    pub environments: HashMap<String, TargetSpec>,
    /// Settings
    #[serde(default)]
    pub settings: Settings,
}
