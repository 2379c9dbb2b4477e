//! The watch loop.
//!
//! Ties the whole pipeline together: initial build, assembly, launch, then
//! cooperative polling for changes. Each cycle re-reads the project
//! descriptors, fingerprints every project, debounces bursts of edits,
//! rebuilds the stale set to its cascade fixed point, and finally delivers
//! the result - hot-swapping through the bridge when every changed project
//! allows it, relaunching the process otherwise.
//!
//! The loop is single-threaded cooperative polling rather than OS file
//! notification: latency is bounded by the poll interval, and in exchange
//! the loop is portable and trivially free of notification races. The only
//! other task is the supervisor's exit worker, which never initiates a
//! rebuild. A stop flag is checked at the top of every iteration; the
//! owner sets it from a Ctrl-C handler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::assemble::{assemble, AssembleError};
use crate::bridge::ReloadBridge;
use crate::builder::BuildRunner;
use crate::cache::{BuildCache, CacheError};
use crate::classify::{classify, ReloadStrategy};
use crate::config::{KilnConfig, RuntimeConfig};
use crate::graph::DependencyGraph;
use crate::hooks::BuildHook;
use crate::manifest::load_workspace;
use crate::orchestrate::{Orchestrator, OrchestrateError, RebuildOptions};
use crate::process::{LaunchSpec, Supervisor, SupervisorError};
use crate::workspace::WorkspaceLayout;

/// Effective settings for one watch session (config merged with CLI
/// overrides).
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Interval between change-detection passes.
    pub poll_interval: std::time::Duration,
    /// Settle time before a detected change is acted upon.
    pub debounce: std::time::Duration,
    /// Active build mode.
    pub mode: String,
    /// Whether project tests are skipped during rebuilds.
    pub skip_tests: bool,
    /// Whether the initial build starts from a cleared cache.
    pub clean: bool,
}

/// Watch pipeline error.
///
/// Only conditions the operator must act on end up here; a failed rebuild
/// keeps the watcher alive with the previous state.
#[derive(Debug, Error)]
pub enum WatchError {
    /// No project descriptors were found under the workspace root.
    #[error("no projects found in the workspace")]
    EmptyWorkspace,

    /// The initial build failed.
    #[error(transparent)]
    Orchestrate(#[from] OrchestrateError),

    /// The served directory could not be assembled.
    #[error(transparent)]
    Assemble(#[from] AssembleError),

    /// The application could not be launched.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// The cache store could not be cleared.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// The watch pipeline.
pub struct Watcher<R: BuildRunner> {
    config: KilnConfig,
    layout: WorkspaceLayout,
    cache: BuildCache,
    runner: R,
    hooks: Vec<Box<dyn BuildHook>>,
    supervisor: Supervisor,
    bridge: ReloadBridge,
    shutdown: Arc<AtomicBool>,
}

impl<R: BuildRunner> Watcher<R> {
    /// A watcher over the given collaborators.
    #[must_use]
    pub fn new(
        config: KilnConfig,
        layout: WorkspaceLayout,
        cache: BuildCache,
        runner: R,
        hooks: Vec<Box<dyn BuildHook>>,
    ) -> Self {
        let supervisor = Supervisor::new(config.shutdown.grace_period);
        Self {
            config,
            layout,
            cache,
            runner,
            hooks,
            supervisor,
            bridge: ReloadBridge::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for requesting shutdown; typically wired to Ctrl-C.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run the full pipeline until shutdown is requested, the supervised
    /// application exits on its own, or a fatal error occurs. The
    /// supervised process is always stopped before returning.
    ///
    /// # Errors
    ///
    /// Returns an error when the initial build fails, the served directory
    /// cannot be assembled, or the application cannot be (re)launched.
    pub async fn run(&mut self, opts: &WatchOptions) -> Result<(), WatchError> {
        let result = self.run_inner(opts).await;
        info!("shutting down");
        self.supervisor.stop().await;
        info!("watcher stopped");
        result
    }

    async fn run_inner(&mut self, opts: &WatchOptions) -> Result<(), WatchError> {
        let rebuild_opts = RebuildOptions {
            mode: opts.mode.clone(),
            skip_tests: opts.skip_tests,
            clean: opts.clean,
        };

        // initial build of the whole workspace, respecting the cache
        let graph = self.load_graph();
        if graph.is_empty() {
            return Err(WatchError::EmptyWorkspace);
        }
        info!(
            projects = graph.len(),
            mode = %opts.mode,
            poll = ?opts.poll_interval,
            "starting watch session"
        );
        if opts.clean {
            self.cache.clear()?;
            info!("build cache cleared");
        }
        {
            let orchestrator =
                Orchestrator::new(&self.layout, &self.cache, &self.runner, &self.hooks);
            orchestrator.build_workspace(&graph, &rebuild_opts).await?;
        }
        assemble(&self.layout, &graph)?;

        // launch and open the bridge session
        let spec = LaunchSpec::resolve(&self.layout, &graph, &self.config.launcher)?;
        self.supervisor.start(&spec)?;
        sleep(self.config.launcher.startup_grace).await;
        self.bridge
            .configure(&RuntimeConfig::load(&self.layout.served_config()));

        info!("watching for changes");
        // incremental rebuilds never run clean
        let rebuild_opts = RebuildOptions {
            clean: false,
            ..rebuild_opts
        };

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(opts.poll_interval).await;
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }
            if !self.supervisor.is_running() {
                warn!("application exited, stopping watcher");
                break;
            }

            // descriptors may have changed; re-read them every cycle
            let graph = self.load_graph();
            if self
                .cache
                .scan_changed(&self.layout, &graph, &opts.mode)
                .is_empty()
            {
                continue;
            }

            // settle, then rescan so a burst of saves is one cycle
            sleep(opts.debounce).await;
            let graph = self.load_graph();
            let changed = self.cache.scan_changed(&self.layout, &graph, &opts.mode);
            if changed.is_empty() {
                continue;
            }
            info!(projects = ?changed, "change detected, rebuilding");

            let rebuilt = {
                let orchestrator =
                    Orchestrator::new(&self.layout, &self.cache, &self.runner, &self.hooks);
                match orchestrator.rebuild(&graph, &changed, &rebuild_opts).await {
                    Ok(rebuilt) => rebuilt,
                    Err(err) => {
                        warn!(%err, "rebuild failed, keeping previous state");
                        continue;
                    }
                }
            };
            if rebuilt.is_empty() {
                continue;
            }

            let runtime = RuntimeConfig::load(&self.layout.served_config());
            let plan = classify(&rebuilt, &graph, runtime.file_watcher);
            match plan.strategy() {
                ReloadStrategy::HotSwap => {
                    let units = plan.hot_swappable.clone();
                    let prepared = self.bridge.prepare_rebuild(&units, &units).await;
                    if prepared.is_confirmed() {
                        assemble(&self.layout, &graph)?;
                        let completed = self.bridge.rebuild_complete(&units).await;
                        if !completed.is_confirmed() {
                            warn!("rebuild-complete not confirmed, units may reload lazily");
                        }
                        info!(units = ?units, "hot-swap complete");
                    } else {
                        // quiesce could not be confirmed; replacing files
                        // under the live process would be unsafe, so take
                        // the relaunch path instead
                        warn!("live process unreachable for quiesce, relaunching");
                        self.relaunch(&graph).await?;
                    }
                }
                ReloadStrategy::Relaunch => {
                    for (id, reason) in &plan.relaunch {
                        info!(project = %id, %reason, "relaunch required");
                    }
                    self.relaunch(&graph).await?;
                }
            }
        }

        Ok(())
    }

    /// Assemble, restart the process with a freshly resolved command, and
    /// open a new bridge session.
    async fn relaunch(&mut self, graph: &DependencyGraph) -> Result<(), WatchError> {
        assemble(&self.layout, graph)?;
        let spec = LaunchSpec::resolve(&self.layout, graph, &self.config.launcher)?;
        self.supervisor.restart(&spec).await?;
        sleep(self.config.launcher.startup_grace).await;
        self.bridge
            .configure(&RuntimeConfig::load(&self.layout.served_config()));
        Ok(())
    }

    fn load_graph(&self) -> DependencyGraph {
        DependencyGraph::resolve(load_workspace(&self.layout))
    }
}
