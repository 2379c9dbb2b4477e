//! CLI command implementations.

use std::path::Path;

use anyhow::{Context as _, Result};
use kiln_core::{BuildCache, DependencyGraph, KilnConfig, WorkspaceLayout};
use tracing::info;

pub mod assemble;
pub mod build;
pub mod invalidate;
pub mod status;
pub mod watch;

/// Resolved workspace state shared by every command.
pub struct Context {
    /// Loaded (or default) configuration.
    pub config: KilnConfig,
    /// Resolved workspace paths.
    pub layout: WorkspaceLayout,
    /// The build cache store.
    pub cache: BuildCache,
}

impl Context {
    /// Load the configuration and resolve the workspace layout.
    ///
    /// A missing config file is not an error: kiln runs fine on defaults.
    pub fn load(workspace: &Path, config_path: &Path) -> Result<Self> {
        let workspace = workspace
            .canonicalize()
            .with_context(|| format!("workspace root not found: {}", workspace.display()))?;

        let config_file = workspace.join(config_path);
        let config = if config_file.is_file() {
            KilnConfig::from_file(&config_file)
                .with_context(|| format!("failed to load {}", config_file.display()))?
        } else {
            info!(path = %config_file.display(), "no config file, using defaults");
            KilnConfig::default()
        };

        let layout = WorkspaceLayout::new(&workspace, &config);
        let cache = BuildCache::new(layout.cache_dir().to_path_buf());
        Ok(Self {
            config,
            layout,
            cache,
        })
    }

    /// Discover projects and resolve the dependency graph.
    pub fn graph(&self) -> DependencyGraph {
        DependencyGraph::resolve(kiln_core::manifest::load_workspace(&self.layout))
    }

    /// The effective build mode: a CLI override, or the configured one.
    pub fn mode(&self, cli_override: Option<String>) -> String {
        cli_override.unwrap_or_else(|| self.config.workspace.mode.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_falls_back_to_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = Context::load(tmp.path(), Path::new("kiln.toml")).unwrap();
        assert_eq!(ctx.config.workspace.mode, "local");
        assert!(ctx.graph().is_empty());
    }

    #[test]
    fn test_config_file_is_honored() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("kiln.toml"),
            "[workspace]\nmode = \"devel\"\n",
        )
        .unwrap();

        let ctx = Context::load(tmp.path(), Path::new("kiln.toml")).unwrap();
        assert_eq!(ctx.mode(None), "devel");
        assert_eq!(ctx.mode(Some("release".to_string())), "release");
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("kiln.toml"), "[workspace\n").unwrap();
        assert!(Context::load(tmp.path(), Path::new("kiln.toml")).is_err());
    }

    #[test]
    fn test_missing_workspace_root_is_an_error() {
        assert!(Context::load(Path::new("/nonexistent/ws"), Path::new("kiln.toml")).is_err());
    }
}
