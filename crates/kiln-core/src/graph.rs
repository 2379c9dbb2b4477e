//! Workspace dependency graph.
//!
//! Builds a deterministic, dependency-ordered view over the discovered
//! projects. The ordering is a post-order depth-first visit of the workspace
//! dependency edges: a project appears only after every dependency that
//! could be resolved, and roots are visited in sorted artifact-id order so
//! the result is independent of filesystem iteration order.
//!
//! Cycles are tolerated rather than rejected: a project that is revisited
//! while still on the visit stack is skipped with a warning, so every
//! participant of a cycle is emitted exactly once, in discovery order. This
//! guarantees termination at the cost of not surfacing cycles as hard
//! errors.

use std::collections::{BTreeMap, HashSet};

use tracing::warn;

use crate::manifest::Project;

/// The resolved workspace: projects keyed by artifact id plus their
/// topological ordering.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    projects: BTreeMap<String, Project>,
    order: Vec<String>,
}

impl DependencyGraph {
    /// Resolve the dependency order over `projects`.
    #[must_use]
    pub fn resolve(projects: BTreeMap<String, Project>) -> Self {
        let mut order = Vec::with_capacity(projects.len());
        let mut visited = HashSet::new();
        let mut visiting = HashSet::new();

        // BTreeMap iteration gives the sorted root order.
        let roots: Vec<String> = projects.keys().cloned().collect();
        for id in roots {
            visit(&projects, &id, &mut visited, &mut visiting, &mut order);
        }

        Self { projects, order }
    }

    /// Artifact ids in dependency order.
    #[must_use]
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Look up a project by artifact id.
    #[must_use]
    pub fn project(&self, artifact_id: &str) -> Option<&Project> {
        self.projects.get(artifact_id)
    }

    /// All projects, keyed by artifact id.
    pub fn projects(&self) -> impl Iterator<Item = (&String, &Project)> {
        self.projects.iter()
    }

    /// Projects that directly declare `artifact_id` as a dependency.
    #[must_use]
    pub fn direct_dependents(&self, artifact_id: &str) -> Vec<&str> {
        self.projects
            .iter()
            .filter(|(id, _)| id.as_str() != artifact_id)
            .filter(|(_, p)| p.manifest.depends_on(artifact_id))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Number of projects in the workspace.
    #[must_use]
    pub fn len(&self) -> usize {
        self.projects.len()
    }

    /// Whether the workspace is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

fn visit(
    projects: &BTreeMap<String, Project>,
    id: &str,
    visited: &mut HashSet<String>,
    visiting: &mut HashSet<String>,
    order: &mut Vec<String>,
) {
    if visited.contains(id) {
        return;
    }
    if visiting.contains(id) {
        warn!(artifact_id = %id, "dependency cycle detected, emitting in discovery order");
        return;
    }
    visiting.insert(id.to_string());

    if let Some(project) = projects.get(id) {
        for dep in &project.manifest.workspace_deps {
            if projects.contains_key(&dep.artifact_id) {
                visit(projects, &dep.artifact_id, visited, visiting, order);
            }
        }
    }

    visiting.remove(id);
    visited.insert(id.to_string());
    order.push(id.to_string());
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::manifest::{DependencyRef, ProjectManifest, ProjectRole};

    fn project(artifact_id: &str, deps: &[&str]) -> Project {
        Project {
            dir: PathBuf::from(format!("/ws/{artifact_id}")),
            manifest: ProjectManifest {
                name: artifact_id.to_string(),
                group_id: "works.example".to_string(),
                artifact_id: artifact_id.to_string(),
                version: "1.0.0".to_string(),
                role: ProjectRole::Library,
                module: None,
                artifact: None,
                workspace_deps: deps
                    .iter()
                    .map(|d| DependencyRef {
                        group_id: "works.example".to_string(),
                        artifact_id: (*d).to_string(),
                        version: None,
                    })
                    .collect(),
            },
        }
    }

    fn graph_of(projects: Vec<Project>) -> DependencyGraph {
        DependencyGraph::resolve(
            projects
                .into_iter()
                .map(|p| (p.manifest.artifact_id.clone(), p))
                .collect(),
        )
    }

    #[test]
    fn test_chain_is_dependency_ordered() {
        // c depends on b depends on a
        let graph = graph_of(vec![
            project("c", &["b"]),
            project("a", &[]),
            project("b", &["a"]),
        ]);
        assert_eq!(graph.order(), ["a", "b", "c"]);
    }

    #[test]
    fn test_order_is_deterministic() {
        let build = || {
            graph_of(vec![
                project("z", &[]),
                project("m", &["z"]),
                project("a", &["z"]),
            ])
        };
        assert_eq!(build().order(), build().order());
        assert_eq!(build().order(), ["a", "z", "m"]);
    }

    #[test]
    fn test_cycle_emits_each_project_once() {
        let graph = graph_of(vec![project("a", &["b"]), project("b", &["a"])]);
        let order = graph.order();
        assert_eq!(order.len(), 2);
        assert_eq!(
            order.iter().filter(|id| id.as_str() == "a").count(),
            1,
            "cycle member emitted more than once"
        );
        assert_eq!(order.iter().filter(|id| id.as_str() == "b").count(), 1);
    }

    #[test]
    fn test_unresolvable_dependency_is_ignored() {
        let graph = graph_of(vec![project("a", &["not-in-workspace"])]);
        assert_eq!(graph.order(), ["a"]);
    }

    #[test]
    fn test_direct_dependents() {
        let graph = graph_of(vec![
            project("a", &[]),
            project("b", &["a"]),
            project("c", &["b"]),
        ]);
        assert_eq!(graph.direct_dependents("a"), vec!["b"]);
        assert_eq!(graph.direct_dependents("b"), vec!["c"]);
        assert!(graph.direct_dependents("c").is_empty());
    }
}
