//! Hot-swap vs. relaunch classification.
//!
//! Given the set of projects that were actually rebuilt in a pass, decide
//! how the running application must pick up the change. The rules are per
//! project:
//!
//! - the application itself changed: relaunch, unconditionally
//! - a plain library changed: relaunch (the running process cannot replace
//!   its own loaded classpath)
//! - a hot-swap unit changed and the live process's file watcher is on:
//!   hot-swappable
//! - a hot-swap unit changed but the file watcher is off: relaunch
//! - the changed id has no manifest: relaunch (fail safe)
//!
//! The batch rule: if *any* changed project requires a relaunch, the whole
//! batch is relaunched - a partial hot-swap next to a pending relaunch is
//! pointless since the relaunch reloads everything anyway.

use tracing::info;

use crate::graph::DependencyGraph;
use crate::manifest::ProjectRole;

/// Why a particular project forces a full relaunch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaunchReason {
    /// The launched entry point itself changed.
    Application,
    /// A classpath library changed.
    Library,
    /// A hot-swap unit changed but the live file watcher is disabled.
    WatchDisabled,
    /// The changed id could not be resolved to a manifest.
    UnknownProject,
}

impl std::fmt::Display for RelaunchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Application => write!(f, "launcher application changed"),
            Self::Library => write!(f, "classpath library changed"),
            Self::WatchDisabled => write!(f, "live file watcher is disabled"),
            Self::UnknownProject => write!(f, "project is unresolvable"),
        }
    }
}

/// How a rebuilt batch is delivered to the running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadStrategy {
    /// Replace artifacts in place and tell the live process to reload them.
    HotSwap,
    /// Stop the process, replace artifacts, start a fresh process.
    Relaunch,
}

/// The classified batch.
#[derive(Debug, Clone)]
pub struct ReloadPlan {
    /// Unit ids (as the live process knows them) of the hot-swappable
    /// members of the batch.
    pub hot_swappable: Vec<String>,
    /// Members that force a relaunch, with the reason kept for the log.
    pub relaunch: Vec<(String, RelaunchReason)>,
}

impl ReloadPlan {
    /// The batch-level decision.
    #[must_use]
    pub fn strategy(&self) -> ReloadStrategy {
        if self.relaunch.is_empty() {
            ReloadStrategy::HotSwap
        } else {
            ReloadStrategy::Relaunch
        }
    }

    /// Whether any member forces a relaunch.
    #[must_use]
    pub fn requires_relaunch(&self) -> bool {
        !self.relaunch.is_empty()
    }
}

/// Classify the rebuilt projects.
///
/// `live_watch_enabled` is the file-watch capability reported by the served
/// runtime configuration of the live process.
#[must_use]
pub fn classify(
    rebuilt: &[String],
    graph: &DependencyGraph,
    live_watch_enabled: bool,
) -> ReloadPlan {
    let mut plan = ReloadPlan {
        hot_swappable: Vec::new(),
        relaunch: Vec::new(),
    };

    for id in rebuilt {
        let Some(project) = graph.project(id) else {
            plan.relaunch.push((id.clone(), RelaunchReason::UnknownProject));
            continue;
        };
        let manifest = &project.manifest;
        match manifest.role {
            ProjectRole::Application => {
                info!(project = %manifest.name, "launcher application changed, relaunch required");
                plan.relaunch.push((id.clone(), RelaunchReason::Application));
            }
            ProjectRole::Library => {
                info!(project = %manifest.name, "classpath library changed, relaunch required");
                plan.relaunch.push((id.clone(), RelaunchReason::Library));
            }
            ProjectRole::HotSwapUnit if live_watch_enabled => {
                info!(project = %manifest.name, "module changed, file watcher on, hot-swap");
                plan.hot_swappable.push(manifest.unit_id().to_string());
            }
            ProjectRole::HotSwapUnit => {
                info!(project = %manifest.name, "module changed, file watcher off, relaunch required");
                plan.relaunch.push((id.clone(), RelaunchReason::WatchDisabled));
            }
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use super::*;
    use crate::manifest::{ModuleMeta, Project, ProjectManifest};

    fn project(artifact_id: &str, role: ProjectRole) -> (String, Project) {
        let module = match role {
            ProjectRole::HotSwapUnit => Some(ModuleMeta { id: None }),
            _ => None,
        };
        (
            artifact_id.to_string(),
            Project {
                dir: PathBuf::from(format!("/ws/{artifact_id}")),
                manifest: ProjectManifest {
                    name: artifact_id.to_string(),
                    group_id: "works.example".to_string(),
                    artifact_id: artifact_id.to_string(),
                    version: "1.0.0".to_string(),
                    role,
                    module,
                    artifact: None,
                    workspace_deps: Vec::new(),
                },
            },
        )
    }

    fn graph() -> DependencyGraph {
        let projects: BTreeMap<_, _> = [
            project("app", ProjectRole::Application),
            project("lib", ProjectRole::Library),
            project("mod", ProjectRole::HotSwapUnit),
        ]
        .into_iter()
        .collect();
        DependencyGraph::resolve(projects)
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_hot_swap_unit_with_watch_enabled() {
        let plan = classify(&ids(&["mod"]), &graph(), true);
        assert_eq!(plan.strategy(), ReloadStrategy::HotSwap);
        assert_eq!(plan.hot_swappable, vec!["mod"]);
    }

    #[test]
    fn test_hot_swap_unit_with_watch_disabled() {
        let plan = classify(&ids(&["mod"]), &graph(), false);
        assert_eq!(plan.strategy(), ReloadStrategy::Relaunch);
        assert_eq!(
            plan.relaunch,
            vec![("mod".to_string(), RelaunchReason::WatchDisabled)]
        );
    }

    #[test]
    fn test_application_always_relaunches() {
        for watch in [true, false] {
            let plan = classify(&ids(&["app"]), &graph(), watch);
            assert_eq!(plan.strategy(), ReloadStrategy::Relaunch);
            assert_eq!(
                plan.relaunch,
                vec![("app".to_string(), RelaunchReason::Application)]
            );
        }
    }

    #[test]
    fn test_library_relaunches() {
        let plan = classify(&ids(&["lib"]), &graph(), true);
        assert_eq!(plan.strategy(), ReloadStrategy::Relaunch);
    }

    #[test]
    fn test_mixed_batch_relaunches() {
        // one hot-swappable member does not save a batch containing a library
        let plan = classify(&ids(&["mod", "lib"]), &graph(), true);
        assert_eq!(plan.strategy(), ReloadStrategy::Relaunch);
        assert_eq!(plan.hot_swappable, vec!["mod"]);
        assert_eq!(plan.relaunch.len(), 1);
    }

    #[test]
    fn test_unknown_project_fails_safe() {
        let plan = classify(&ids(&["ghost"]), &graph(), true);
        assert_eq!(plan.strategy(), ReloadStrategy::Relaunch);
        assert_eq!(
            plan.relaunch,
            vec![("ghost".to_string(), RelaunchReason::UnknownProject)]
        );
    }

    #[test]
    fn test_empty_batch_hot_swaps_trivially() {
        let plan = classify(&[], &graph(), false);
        assert!(!plan.requires_relaunch());
        assert!(plan.hot_swappable.is_empty());
    }
}
