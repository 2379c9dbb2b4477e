//! The external build tool seam.
//!
//! Compiling source code is not kiln's job: the orchestrator talks to the
//! build tool through the narrow [`BuildRunner`] trait, and the stock
//! implementation, [`CommandBuildRunner`], simply spawns the configured
//! command in the project directory with its output streaming to the
//! terminal.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::BuilderConfig;

/// One build invocation.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Human-readable project name, for diagnostics.
    pub project_name: String,
    /// Project root the tool runs in.
    pub project_dir: PathBuf,
    /// Active build mode.
    pub mode: String,
    /// Whether to skip the project's tests.
    pub skip_tests: bool,
    /// Whether to run a clean build.
    pub clean: bool,
    /// Descriptor file to use instead of the project's own, if a pre-build
    /// hook generated one.
    pub descriptor_override: Option<PathBuf>,
    /// Extra arguments contributed by hooks.
    pub extra_args: Vec<String>,
}

/// Build invocation error.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The tool ran and reported failure.
    #[error("build failed for {project} (exit {code:?})")]
    Failed {
        /// Project that failed.
        project: String,
        /// Exit code, if the process exited normally.
        code: Option<i32>,
    },

    /// The configured tool executable was not found.
    #[error("build tool '{command}' not found on PATH")]
    ToolNotFound {
        /// The missing executable.
        command: String,
    },

    /// The tool could not be spawned or awaited.
    #[error("failed to run build tool: {0}")]
    Io(#[from] std::io::Error),
}

/// Anything that can build one project.
#[async_trait]
pub trait BuildRunner: Send + Sync {
    /// Run one build to completion.
    ///
    /// # Errors
    ///
    /// Returns an error when the build fails or cannot be started.
    async fn build(&self, request: &BuildRequest) -> Result<(), BuildError>;
}

/// Runs the build tool configured in `[builder]`.
#[derive(Debug, Clone)]
pub struct CommandBuildRunner {
    config: BuilderConfig,
}

impl CommandBuildRunner {
    /// A runner over the given tool configuration.
    #[must_use]
    pub fn new(config: BuilderConfig) -> Self {
        Self { config }
    }

    fn command_line(&self, request: &BuildRequest) -> Vec<String> {
        let base = if request.clean {
            &self.config.clean_args
        } else {
            &self.config.args
        };
        let mut args = base.clone();
        if let Some(descriptor) = &request.descriptor_override {
            args.push(self.config.descriptor_flag.clone());
            args.push(descriptor.display().to_string());
        }
        if request.skip_tests {
            args.extend(self.config.skip_tests_args.iter().cloned());
        }
        args.extend(request.extra_args.iter().cloned());
        args
    }
}

#[async_trait]
impl BuildRunner for CommandBuildRunner {
    async fn build(&self, request: &BuildRequest) -> Result<(), BuildError> {
        let args = self.command_line(request);
        info!(
            project = %request.project_name,
            command = %self.config.command,
            ?args,
            "running build tool"
        );
        let started = Instant::now();

        let status = tokio::process::Command::new(&self.config.command)
            .args(&args)
            .current_dir(&request.project_dir)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    BuildError::ToolNotFound {
                        command: self.config.command.clone(),
                    }
                } else {
                    BuildError::Io(err)
                }
            })?;

        if status.success() {
            info!(
                project = %request.project_name,
                elapsed = ?started.elapsed(),
                "build succeeded"
            );
            Ok(())
        } else {
            Err(BuildError::Failed {
                project: request.project_name.clone(),
                code: status.code(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(clean: bool, skip_tests: bool) -> BuildRequest {
        BuildRequest {
            project_name: "kit".to_string(),
            project_dir: PathBuf::from("/ws/kit"),
            mode: "local".to_string(),
            skip_tests,
            clean,
            descriptor_override: None,
            extra_args: Vec::new(),
        }
    }

    #[test]
    fn test_incremental_command_line() {
        let runner = CommandBuildRunner::new(BuilderConfig::default());
        assert_eq!(
            runner.command_line(&request(false, false)),
            vec!["--batch-mode", "install"]
        );
    }

    #[test]
    fn test_clean_skip_tests_command_line() {
        let runner = CommandBuildRunner::new(BuilderConfig::default());
        assert_eq!(
            runner.command_line(&request(true, true)),
            vec!["--batch-mode", "clean", "install", "-DskipTests"]
        );
    }

    #[test]
    fn test_descriptor_override_and_extra_args() {
        let runner = CommandBuildRunner::new(BuilderConfig::default());
        let mut req = request(false, false);
        req.descriptor_override = Some(PathBuf::from("/ws/kit/.kiln-pom.xml"));
        req.extra_args = vec!["-Pquick".to_string()];
        assert_eq!(
            runner.command_line(&req),
            vec!["--batch-mode", "install", "-f", "/ws/kit/.kiln-pom.xml", "-Pquick"]
        );
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    async fn test_successful_build() {
        let mut config = BuilderConfig::default();
        config.command = "true".to_string();
        config.args = Vec::new();
        let runner = CommandBuildRunner::new(config);

        let mut req = request(false, false);
        req.project_dir = std::env::temp_dir();
        runner.build(&req).await.unwrap();
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    async fn test_failed_build_reports_exit_code() {
        let mut config = BuilderConfig::default();
        config.command = "false".to_string();
        config.args = Vec::new();
        let runner = CommandBuildRunner::new(config);

        let mut req = request(false, false);
        req.project_dir = std::env::temp_dir();
        let err = runner.build(&req).await.unwrap_err();
        assert!(matches!(err, BuildError::Failed { code: Some(1), .. }));
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore)]
    async fn test_missing_tool_is_reported() {
        let mut config = BuilderConfig::default();
        config.command = "definitely-not-a-build-tool".to_string();
        let runner = CommandBuildRunner::new(config);

        let mut req = request(false, false);
        req.project_dir = std::env::temp_dir();
        let err = runner.build(&req).await.unwrap_err();
        assert!(matches!(err, BuildError::ToolNotFound { .. }));
    }
}
