//! Target selection

use crate::project::{GroupMap, Project, TargetSpec};

/// Resolves a [`TargetSpec`] against the current projects and groups
pub struct TargetSelector;

impl TargetSelector {
    /// Select the projects a target refers to
    ///
    /// `None` and any spec containing `all` select every project. Otherwise
    /// each entry resolves on its own (project name first, then group name)
    /// and the results are concatenated in entry order. Nothing is
    /// de-duplicated: a project reached through two entries is returned
    /// twice. Unknown names select nothing.
    pub fn select(all: &[Project], target: Option<&TargetSpec>, groups: &GroupMap) -> Vec<Project> {
        let Some(target) = target else {
            return all.to_vec();
        };

        if target.is_all() {
            return all.to_vec();
        }

        let mut selected = Vec::new();
        for entry in target.entries() {
            if let Some(project) = find(all, entry) {
                selected.push(project.clone());
            } else if let Some(members) = groups.get(entry) {
                for member in members {
                    match find(all, member) {
                        Some(project) => selected.push(project.clone()),
                        None => tracing::debug!(
                            "Group {} member {} is not a project, skipping",
                            entry,
                            member
                        ),
                    }
                }
            } else {
                tracing::debug!("Target {} matches no project or group", entry);
            }
        }

        selected
    }
}

fn find<'a>(all: &'a [Project], name: &str) -> Option<&'a Project> {
    all.iter().find(|p| p.name == name)
}
