//! Dependency-ordered rebuilds.
//!
//! Two entry points:
//!
//! - [`Orchestrator::build_workspace`] - the full pass: every project in
//!   dependency order, skipping those the cache proves up to date.
//! - [`Orchestrator::rebuild`] - the incremental pass: a stale set is
//!   rebuilt to its transitive fixed point. After every successful build
//!   the dependents of the rebuilt project are cascade-invalidated and
//!   appended to the work queue, which stays ordered relative to the full
//!   graph. Each project is rebuilt at most once per pass - its own cache
//!   entry, once rebuilt, is never re-invalidated by its own rebuild - so
//!   the iteration terminates even on cyclic graphs.
//!
//! A failed build (or a failed pre-build hook) stops the queue immediately;
//! projects already rebuilt keep their fresh cache entries. There is no
//! rollback.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{info, warn};

use crate::builder::{BuildError, BuildRequest, BuildRunner};
use crate::cache::{BuildCache, CacheError};
use crate::graph::DependencyGraph;
use crate::hooks::{BuildHook, HookContext, HookError, HookOutcome, HookPhase};
use crate::workspace::WorkspaceLayout;

/// Options shared by every build in one pass.
#[derive(Debug, Clone)]
pub struct RebuildOptions {
    /// Active build mode.
    pub mode: String,
    /// Whether project tests are skipped.
    pub skip_tests: bool,
    /// Whether builds run clean.
    pub clean: bool,
}

/// Orchestration error.
#[derive(Debug, Error)]
pub enum OrchestrateError {
    /// A pre-build hook refused the build.
    #[error("pre-build hook failed for {project}: {source}")]
    Hook {
        /// Project whose hook failed.
        project: String,
        /// Underlying hook error.
        source: HookError,
    },

    /// The external build tool reported failure.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// The cache entry could not be persisted after a successful build.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Result of a full workspace pass.
#[derive(Debug, Default)]
pub struct BuildSummary {
    /// Projects that were rebuilt, in build order.
    pub built: Vec<String>,
    /// Projects the cache proved up to date.
    pub skipped: Vec<String>,
}

/// Drives builds over the dependency graph.
pub struct Orchestrator<'a, R: BuildRunner> {
    layout: &'a WorkspaceLayout,
    cache: &'a BuildCache,
    runner: &'a R,
    hooks: &'a [Box<dyn BuildHook>],
}

impl<'a, R: BuildRunner> Orchestrator<'a, R> {
    /// An orchestrator over the given collaborators.
    #[must_use]
    pub fn new(
        layout: &'a WorkspaceLayout,
        cache: &'a BuildCache,
        runner: &'a R,
        hooks: &'a [Box<dyn BuildHook>],
    ) -> Self {
        Self {
            layout,
            cache,
            runner,
            hooks,
        }
    }

    /// Build every project in dependency order, skipping up-to-date ones.
    ///
    /// # Errors
    ///
    /// Returns the first hook, build, or cache-write error; projects built
    /// before the failure keep their cache entries.
    pub async fn build_workspace(
        &self,
        graph: &DependencyGraph,
        opts: &RebuildOptions,
    ) -> Result<BuildSummary, OrchestrateError> {
        let mut summary = BuildSummary::default();
        let total = graph.len();

        for (step, id) in graph.order().iter().enumerate() {
            let Some(project) = graph.project(id) else {
                continue;
            };
            info!(step = step + 1, total, project = %project.manifest.name, "workspace build");

            let artifact = self.layout.artifact_path(project);
            if !opts.clean
                && self
                    .cache
                    .is_up_to_date(self.layout, project, graph, &opts.mode, &artifact)
            {
                info!(project = %project.manifest.name, "up to date, skipping");
                summary.skipped.push(id.clone());
                continue;
            }

            self.build_one(graph, id, opts).await?;
            summary.built.push(id.clone());

            // a dependent's fingerprint only tracks this project's version,
            // not its content, so its entry must be dropped explicitly or a
            // later project in this same pass would skip against stale output
            let invalidated = self.cache.invalidate_dependents(id, graph);
            if !invalidated.is_empty() {
                info!(project = %id, dependents = ?invalidated, "cache invalidated for dependents");
            }
        }

        Ok(summary)
    }

    /// Rebuild the stale set plus everything cascade invalidation pulls in,
    /// in dependency order. Returns the ids actually rebuilt, in build
    /// order.
    ///
    /// # Errors
    ///
    /// Returns the first hook, build, or cache-write error; projects built
    /// before the failure keep their cache entries.
    pub async fn rebuild(
        &self,
        graph: &DependencyGraph,
        stale: &[String],
        opts: &RebuildOptions,
    ) -> Result<Vec<String>, OrchestrateError> {
        let mut pending: HashSet<String> = stale
            .iter()
            .filter(|id| {
                let known = graph.project(id).is_some();
                if !known {
                    warn!(artifact_id = %id, "stale id not in workspace, ignoring");
                }
                known
            })
            .cloned()
            .collect();
        let mut rebuilt: Vec<String> = Vec::new();

        // Fixed-point iteration: sweep the topological order, building
        // every pending project; cascade targets discovered behind the
        // sweep cursor are picked up by the next sweep. Terminates because
        // a rebuilt project is never re-queued.
        while !pending.is_empty() {
            for id in graph.order() {
                if !pending.remove(id) {
                    continue;
                }
                self.build_one(graph, id, opts).await?;

                let newly_stale = self.cache.invalidate_dependents(id, graph);
                rebuilt.push(id.clone());
                for dep in newly_stale {
                    if !rebuilt.contains(&dep) && !pending.contains(&dep) {
                        info!(artifact_id = %dep, cause = %id, "cascade: queued for rebuild");
                        pending.insert(dep);
                    }
                }
            }
        }

        Ok(rebuilt)
    }

    /// Hooks, build, and cache update for one project.
    async fn build_one(
        &self,
        graph: &DependencyGraph,
        id: &str,
        opts: &RebuildOptions,
    ) -> Result<(), OrchestrateError> {
        let project = graph
            .project(id)
            .expect("build_one is only called with ids resolved from the graph");
        let name = project.manifest.name.clone();

        let ctx = HookContext {
            project_name: name.clone(),
            project_dir: project.dir.clone(),
            workspace_root: self.layout.root().to_path_buf(),
            mode: opts.mode.clone(),
        };
        let mut merged = HookOutcome::default();
        for hook in self.hooks.iter().filter(|h| h.phase() == HookPhase::PreBuild) {
            info!(project = %name, hook = hook.name(), "pre-build hook");
            let outcome = hook.run(&ctx).map_err(|source| OrchestrateError::Hook {
                project: name.clone(),
                source,
            })?;
            if outcome.descriptor_override.is_some() {
                merged.descriptor_override = outcome.descriptor_override;
            }
            merged.extra_args.extend(outcome.extra_args);
        }

        let request = BuildRequest {
            project_name: name,
            project_dir: project.dir.clone(),
            mode: opts.mode.clone(),
            skip_tests: opts.skip_tests,
            clean: opts.clean,
            descriptor_override: merged.descriptor_override,
            extra_args: merged.extra_args,
        };
        self.runner.build(&request).await?;

        // post-build hooks run for their side effects; a failure here must
        // not fail a build that already succeeded
        for hook in self.hooks.iter().filter(|h| h.phase() == HookPhase::PostBuild) {
            info!(project = %request.project_name, hook = hook.name(), "post-build hook");
            if let Err(err) = hook.run(&ctx) {
                warn!(project = %request.project_name, hook = hook.name(), %err, "post-build hook failed");
            }
        }

        self.cache
            .mark_built(self.layout, project, graph, &opts.mode)?;
        Ok(())
    }
}
