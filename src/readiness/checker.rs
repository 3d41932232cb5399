//! Retrying readiness checks

use super::probe::{Prober, ReadinessProbe};
use crate::error::Result;
use crate::process::ProcessRunner;
use crate::project::config::DEFAULT_PROBE_TIMEOUT_MS;
use crate::project::{Project, ReadinessPolicy, ReadinessSpec};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A dependency to wait for
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    /// Project name
    pub name: String,
    /// Readiness check
    pub spec: ReadinessSpec,
    /// Directory the check runs in; falls back to the caller's context
    pub dir: Option<PathBuf>,
}

impl Dependency {
    /// Dependency with no directory of its own
    pub fn new(name: &str, spec: ReadinessSpec) -> Self {
        Self {
            name: name.to_string(),
            spec,
            dir: None,
        }
    }

    /// Dependency on a project, if it has a readiness check
    pub fn of(project: &Project, root: &Path) -> Option<Self> {
        project.readiness.as_ref().map(|spec| Self {
            name: project.name.clone(),
            spec: spec.clone(),
            dir: Some(project.directory(root)),
        })
    }
}

/// Decides whether dependencies are ready
pub struct ReadinessChecker {
    probe: Arc<dyn ReadinessProbe>,
}

impl ReadinessChecker {
    /// Create a checker around a probe
    pub fn new(probe: Arc<dyn ReadinessProbe>) -> Self {
        Self { probe }
    }

    /// Checker using the built-in probes
    pub fn system(runner: Arc<dyn ProcessRunner>) -> Result<Self> {
        Ok(Self::new(Arc::new(Prober::new(runner)?)))
    }

    /// Run one probe, no retries
    pub async fn check_one(&self, spec: &ReadinessSpec, context: &Path) -> bool {
        self.check(spec, context, DEFAULT_PROBE_TIMEOUT_MS).await
    }

    /// A project without a readiness check is always ready
    pub async fn check_dependency_readiness(&self, project: &Project, root: &Path) -> bool {
        match project.readiness {
            Some(ref spec) => self.check_one(spec, &project.directory(root)).await,
            None => true,
        }
    }

    async fn check(&self, spec: &ReadinessSpec, context: &Path, default_timeout_ms: u64) -> bool {
        let timeout = spec.timeout_or(default_timeout_ms);
        match self.probe.probe(spec, context, timeout).await {
            Ok(ready) => ready,
            Err(e) => {
                tracing::warn!("Readiness probe failed: {}", e);
                false
            }
        }
    }

    /// Wait until every dependency is ready
    ///
    /// All dependencies are probed concurrently each round. Rounds repeat
    /// `policy.max_retries` times (the first round counts) with
    /// `policy.retry_delay_ms` between them. The dependencies still failing
    /// in the last round are logged before returning `false`.
    pub async fn wait_for(&self, deps: &[Dependency], context: &Path, policy: &ReadinessPolicy) -> bool {
        if deps.is_empty() {
            return true;
        }

        let attempts = policy.max_retries.max(1);
        let mut last = Vec::new();

        for attempt in 1..=attempts {
            let round = deps.iter().map(|dep| {
                let dir = dep.dir.as_deref().unwrap_or(context);
                self.check(&dep.spec, dir, policy.timeout_ms)
            });
            let results = join_all(round).await;

            if results.iter().all(|ready| *ready) {
                tracing::info!(
                    "Dependencies ready: {}",
                    deps.iter().map(|d| d.name.as_str()).collect::<Vec<_>>().join(", ")
                );
                return true;
            }

            last = results;
            if attempt < attempts {
                tracing::debug!(
                    "Dependencies not ready (attempt {}/{}), retrying in {}ms",
                    attempt,
                    attempts,
                    policy.retry_delay_ms
                );
                tokio::time::sleep(policy.retry_delay()).await;
            }
        }

        let failing: Vec<&str> = deps
            .iter()
            .zip(&last)
            .filter(|(_, ready)| !**ready)
            .map(|(dep, _)| dep.name.as_str())
            .collect();
        tracing::warn!(
            "Dependencies not ready after {} attempts: {}",
            attempts,
            failing.join(", ")
        );

        false
    }
}
