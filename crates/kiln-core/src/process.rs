//! Supervision of the launched application process.
//!
//! The supervisor owns exactly one OS process at a time. The lifecycle is an
//! explicit state machine
//!
//! ```text
//! stopped -> starting -> running -> stopping -> stopped
//! ```
//!
//! with restart being stop immediately followed by start - never a mutation
//! of a running process. Each start resolves the launch command afresh (the
//! artifact name may have changed between builds) and hands the child to a
//! brand-new worker task that does nothing but await process exit and
//! publish the status; the worker handle is replaced, not reused, so an old
//! worker's exit detection can never race a new worker's startup.

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::LauncherConfig;
use crate::graph::DependencyGraph;
use crate::manifest::ProjectRole;
use crate::workspace::WorkspaceLayout;

/// Supervisor lifecycle error.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The workspace declares no application project.
    #[error("no application project in the workspace")]
    NoApplication,

    /// The launcher artifact is not in the served directory.
    #[error("launcher artifact not found: {0}")]
    MissingLauncher(PathBuf),

    /// The process could not be spawned.
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        /// The launcher executable.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// The fully resolved launch command.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Executable.
    pub command: String,
    /// Arguments after placeholder substitution.
    pub args: Vec<String>,
    /// Working directory (the served directory).
    pub cwd: PathBuf,
}

impl LaunchSpec {
    /// Resolve the launch command from the current workspace state.
    ///
    /// Looks up the application project, checks its served artifact exists,
    /// and substitutes the `{artifact}` and `{config}` placeholders in the
    /// configured launcher arguments.
    ///
    /// # Errors
    ///
    /// Returns an error when the workspace has no application project or
    /// the launcher artifact is missing from the served directory.
    pub fn resolve(
        layout: &WorkspaceLayout,
        graph: &DependencyGraph,
        config: &LauncherConfig,
    ) -> Result<Self, SupervisorError> {
        let (_, app) = graph
            .projects()
            .find(|(_, p)| p.manifest.role == ProjectRole::Application)
            .ok_or(SupervisorError::NoApplication)?;

        let artifact = layout.served_artifact(&app.manifest);
        if !artifact.exists() {
            return Err(SupervisorError::MissingLauncher(artifact));
        }

        let artifact_str = artifact.display().to_string();
        let config_str = layout.served_config().display().to_string();
        let args = config
            .args
            .iter()
            .map(|a| {
                a.replace("{artifact}", &artifact_str)
                    .replace("{config}", &config_str)
            })
            .collect();

        Ok(Self {
            command: config.command.clone(),
            args,
            cwd: layout.output_dir().to_path_buf(),
        })
    }
}

/// Supervisor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// No process is owned.
    Stopped,
    /// A spawn is in progress.
    Starting,
    /// A process is owned (it may have exited on its own; see
    /// [`Supervisor::is_running`]).
    Running,
    /// A graceful shutdown is in progress.
    Stopping,
}

struct RunningProcess {
    pid: u32,
    exit_rx: watch::Receiver<Option<ExitStatus>>,
    worker: JoinHandle<()>,
}

/// Owns the lifecycle of the launched application process.
pub struct Supervisor {
    grace_period: Duration,
    state: SupervisorState,
    current: Option<RunningProcess>,
}

impl Supervisor {
    /// A supervisor that allows `grace_period` between SIGTERM and a forced
    /// kill.
    #[must_use]
    pub fn new(grace_period: Duration) -> Self {
        Self {
            grace_period,
            state: SupervisorState::Stopped,
            current: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Whether the supervised process is still alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|p| p.exit_rx.borrow().is_none())
    }

    /// Spawn the process described by `spec` and supervise it.
    ///
    /// # Errors
    ///
    /// Returns an error when the spawn fails. The supervisor is left in the
    /// stopped state in that case.
    ///
    /// # Panics
    ///
    /// Panics if called while a process is already supervised; callers must
    /// go through [`Supervisor::restart`] or [`Supervisor::stop`] first.
    pub fn start(&mut self, spec: &LaunchSpec) -> Result<u32, SupervisorError> {
        assert!(
            self.current.is_none(),
            "supervisor already owns a process; stop it first"
        );
        self.state = SupervisorState::Starting;
        info!(command = %spec.command, args = ?spec.args, "launching application");

        let mut child = tokio::process::Command::new(&spec.command)
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| {
                self.state = SupervisorState::Stopped;
                SupervisorError::Spawn {
                    command: spec.command.clone(),
                    source,
                }
            })?;

        let pid = child.id().ok_or_else(|| {
            self.state = SupervisorState::Stopped;
            SupervisorError::Spawn {
                command: spec.command.clone(),
                source: std::io::Error::other("spawned process has no pid"),
            }
        })?;

        let (exit_tx, exit_rx) = watch::channel(None);
        let worker = tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => {
                    info!(pid, %status, "application exited");
                    let _ = exit_tx.send(Some(status));
                }
                Err(err) => {
                    warn!(pid, %err, "failed to await application exit");
                    let _ = exit_tx.send(Some(ExitStatus::from_raw(0)));
                }
            }
        });

        self.current = Some(RunningProcess {
            pid,
            exit_rx,
            worker,
        });
        self.state = SupervisorState::Running;
        info!(pid, "application started");
        Ok(pid)
    }

    /// Gracefully stop the supervised process: SIGTERM, wait up to the
    /// grace period, SIGKILL if it has not exited, then await the worker.
    /// A no-op when nothing is supervised.
    pub async fn stop(&mut self) {
        let Some(mut process) = self.current.take() else {
            return;
        };
        self.state = SupervisorState::Stopping;

        if process.exit_rx.borrow().is_none() {
            info!(pid = process.pid, "stopping application");
            signal_process(process.pid, Signal::SIGTERM);

            let exited =
                tokio::time::timeout(self.grace_period, process.exit_rx.changed()).await;
            if exited.is_err() {
                warn!(
                    pid = process.pid,
                    grace = ?self.grace_period,
                    "application ignored SIGTERM, killing"
                );
                signal_process(process.pid, Signal::SIGKILL);
                // the kill cannot be ignored; wait for the worker to observe it
                let _ = process.exit_rx.changed().await;
            }
        }

        if let Err(err) = process.worker.await {
            warn!(pid = process.pid, %err, "exit worker failed");
        }
        self.state = SupervisorState::Stopped;
    }

    /// Stop the current process (if any) and start a fresh one from `spec`.
    /// The old process is always fully terminated before the replacement is
    /// spawned, so two supervised processes never run concurrently.
    ///
    /// # Errors
    ///
    /// Returns an error when the new spawn fails; the old process is still
    /// stopped in that case.
    pub async fn restart(&mut self, spec: &LaunchSpec) -> Result<u32, SupervisorError> {
        info!("relaunching application");
        self.stop().await;
        self.start(spec)
    }
}

fn signal_process(pid: u32, signal: Signal) {
    #[allow(clippy::cast_possible_wrap)]
    let pid = Pid::from_raw(pid as i32);
    if let Err(err) = kill(pid, signal) {
        // ESRCH just means the process exited in the meantime
        if err != nix::errno::Errno::ESRCH {
            warn!(%pid, %signal, %err, "failed to signal process");
        }
    }
}
