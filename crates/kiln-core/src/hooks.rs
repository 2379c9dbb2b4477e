//! Pre- and post-build hooks.
//!
//! A pre-build hook runs immediately before a project's build and may point
//! the build tool at a generated descriptor (for example one with workspace
//! dependency versions synchronized) or contribute extra arguments; a
//! failing pre-build hook aborts that project's rebuild. Post-build hooks
//! run after a successful build; their failures are logged but never fail
//! the build that already succeeded. Hooks are collaborators: kiln defines
//! the seam and honors the outcome, but ships no descriptor-rewriting logic
//! of its own.

use std::path::PathBuf;

use thiserror::Error;

/// When a hook runs relative to the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    /// Before the build tool is invoked.
    PreBuild,
    /// After the build tool reported success.
    PostBuild,
}

/// Context handed to every hook invocation.
#[derive(Debug, Clone)]
pub struct HookContext {
    /// Human-readable project name.
    pub project_name: String,
    /// Project root.
    pub project_dir: PathBuf,
    /// Workspace root.
    pub workspace_root: PathBuf,
    /// Active build mode.
    pub mode: String,
}

/// What a hook contributed to the upcoming build.
#[derive(Debug, Clone, Default)]
pub struct HookOutcome {
    /// Descriptor file to build against instead of the project's own.
    pub descriptor_override: Option<PathBuf>,
    /// Extra build tool arguments.
    pub extra_args: Vec<String>,
}

/// Hook failure.
#[derive(Debug, Error)]
pub enum HookError {
    /// The hook decided the build must not proceed.
    #[error("{0}")]
    Failed(String),

    /// The hook hit an I/O problem.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A build hook.
pub trait BuildHook: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// When the hook runs. Pre-build unless overridden.
    fn phase(&self) -> HookPhase {
        HookPhase::PreBuild
    }

    /// Run the hook.
    ///
    /// # Errors
    ///
    /// Returns an error to abort the project's rebuild (pre-build hooks
    /// only; a post-build failure is logged and swallowed).
    fn run(&self, ctx: &HookContext) -> Result<HookOutcome, HookError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingHook;

    impl BuildHook for RecordingHook {
        fn name(&self) -> &str {
            "recording"
        }

        fn run(&self, ctx: &HookContext) -> Result<HookOutcome, HookError> {
            Ok(HookOutcome {
                descriptor_override: Some(ctx.project_dir.join(".generated.xml")),
                extra_args: vec![format!("-Dmode={}", ctx.mode)],
            })
        }
    }

    #[test]
    fn test_hook_outcome_carries_override() {
        let ctx = HookContext {
            project_name: "kit".to_string(),
            project_dir: PathBuf::from("/ws/kit"),
            workspace_root: PathBuf::from("/ws"),
            mode: "devel".to_string(),
        };
        let outcome = RecordingHook.run(&ctx).unwrap();
        assert_eq!(
            outcome.descriptor_override.as_deref(),
            Some(std::path::Path::new("/ws/kit/.generated.xml"))
        );
        assert_eq!(outcome.extra_args, vec!["-Dmode=devel"]);
    }
}
