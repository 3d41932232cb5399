//! Dependency ordering

use crate::project::{DependencyMap, Project};
use std::collections::HashSet;

/// Ordered projects plus the cycle signal
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Start order (dependencies first)
    pub order: Vec<Project>,
    /// Projects left unresolved because of a cycle; `order` is then the
    /// input order unchanged
    pub cycle: Option<Vec<String>>,
}

impl Resolution {
    /// Names in start order
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|p| p.name.as_str()).collect()
    }

    /// Stop order (dependents first)
    pub fn reversed(&self) -> Vec<Project> {
        self.order.iter().rev().cloned().collect()
    }

    /// Whether a cycle was detected
    pub fn has_cycle(&self) -> bool {
        self.cycle.is_some()
    }
}

/// Turns a project list and a dependency map into a start order
pub struct DependencyResolver;

impl DependencyResolver {
    /// Order `projects` so that every project comes after its dependencies
    ///
    /// Only dependencies inside `projects` are considered. Projects with no
    /// ordering constraint between them keep their input order. On a cycle
    /// the input order is returned unchanged and the cycle is reported.
    pub fn resolve(projects: &[Project], deps: &DependencyMap) -> Resolution {
        if deps.is_empty() {
            return Resolution {
                order: projects.to_vec(),
                cycle: None,
            };
        }

        let in_set: HashSet<&str> = projects.iter().map(|p| p.name.as_str()).collect();

        // In-set prerequisites of each input position
        let requires: Vec<Vec<&str>> = projects
            .iter()
            .map(|p| {
                deps.get(&p.name)
                    .map(|list| {
                        list.iter()
                            .map(String::as_str)
                            .filter(|d| in_set.contains(d))
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect();

        // Outstanding copies per name, so duplicates are waited on as a whole
        let mut pending: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        for project in projects {
            *pending.entry(project.name.as_str()).or_insert(0) += 1;
        }

        let mut emitted = vec![false; projects.len()];
        let mut order = Vec::with_capacity(projects.len());

        while order.len() < projects.len() {
            let next = (0..projects.len()).find(|&i| {
                !emitted[i]
                    && requires[i]
                        .iter()
                        .all(|d| pending.get(d).copied().unwrap_or(0) == 0)
            });

            let Some(i) = next else {
                let cycle: Vec<String> = projects
                    .iter()
                    .zip(&emitted)
                    .filter(|(_, done)| !**done)
                    .map(|(p, _)| p.name.clone())
                    .collect();

                tracing::warn!(
                    "Circular dependency detected among [{}], using declaration order",
                    cycle.join(", ")
                );

                return Resolution {
                    order: projects.to_vec(),
                    cycle: Some(cycle),
                };
            };

            emitted[i] = true;
            if let Some(count) = pending.get_mut(projects[i].name.as_str()) {
                *count -= 1;
            }
            order.push(projects[i].clone());
        }

        Resolution { order, cycle: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn projects(names: &[&str]) -> Vec<Project> {
        names.iter().map(|n| Project::new(n, n)).collect()
    }

    fn deps(edges: &[(&str, &[&str])]) -> DependencyMap {
        edges
            .iter()
            .map(|(p, ds)| (p.to_string(), ds.iter().map(|d| d.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_chain_order() {
        let resolution = DependencyResolver::resolve(
            &projects(&["a", "b", "c"]),
            &deps(&[("b", &["a"]), ("c", &["b"])]),
        );
        assert_eq!(resolution.names(), vec!["a", "b", "c"]);
        let stop: Vec<String> = resolution.reversed().into_iter().map(|p| p.name).collect();
        assert_eq!(stop, vec!["c", "b", "a"]);
        assert!(!resolution.has_cycle());
    }

    #[test]
    fn test_dependencies_first() {
        let resolution = DependencyResolver::resolve(
            &projects(&["web", "api", "db"]),
            &deps(&[("web", &["api"]), ("api", &["db"])]),
        );
        assert_eq!(resolution.names(), vec!["db", "api", "web"]);
    }

    #[test]
    fn test_stable_for_unrelated() {
        let resolution = DependencyResolver::resolve(
            &projects(&["docs", "web", "cache", "api"]),
            &deps(&[("web", &["api"])]),
        );
        assert_eq!(resolution.names(), vec!["docs", "cache", "api", "web"]);
    }

    #[test]
    fn test_empty_deps_is_identity() {
        let input = projects(&["c", "a", "b"]);
        let resolution = DependencyResolver::resolve(&input, &DependencyMap::new());
        assert_eq!(resolution.order, input);
    }

    #[test]
    fn test_dangling_references_dropped() {
        let resolution = DependencyResolver::resolve(
            &projects(&["api", "web"]),
            &deps(&[("web", &["api", "cdn"]), ("worker", &["api"])]),
        );
        assert_eq!(resolution.names(), vec!["api", "web"]);
    }

    #[test]
    fn test_subset_ignores_outside_projects() {
        // db is not selected, so api has nothing to wait for
        let resolution = DependencyResolver::resolve(
            &projects(&["web", "api"]),
            &deps(&[("web", &["api"]), ("api", &["db"])]),
        );
        assert_eq!(resolution.names(), vec!["api", "web"]);
    }

    #[test]
    fn test_cycle_returns_input_order() {
        let input = projects(&["a", "b"]);
        let resolution =
            DependencyResolver::resolve(&input, &deps(&[("a", &["b"]), ("b", &["a"])]));
        assert_eq!(resolution.order, input);
        assert_eq!(resolution.cycle, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let input = projects(&["a", "b"]);
        let resolution = DependencyResolver::resolve(&input, &deps(&[("a", &["a"])]));
        assert_eq!(resolution.order, input);
        assert!(resolution.has_cycle());
    }

    #[test]
    fn test_permutation_property() {
        let input = projects(&["e", "d", "c", "b", "a"]);
        let map = deps(&[
            ("e", &["a", "b"]),
            ("d", &["c"]),
            ("c", &["a"]),
            ("b", &["zzz"]),
        ]);
        let resolution = DependencyResolver::resolve(&input, &map);

        assert_eq!(resolution.order.len(), input.len());
        let mut got = resolution.names();
        got.sort();
        assert_eq!(got, vec!["a", "b", "c", "d", "e"]);

        let position = |n: &str| resolution.names().iter().position(|x| *x == n).unwrap();
        for (project, list) in &map {
            for dep in list {
                if input.iter().any(|p| &p.name == dep) {
                    assert!(position(dep) < position(project), "{} before {}", dep, project);
                }
            }
        }
    }
}
