//! Workspace layout resolution.
//!
//! All paths the orchestrator touches are derived here from the workspace
//! root and [`WorkspaceSettings`](crate::config::WorkspaceSettings), so the
//! rest of the crate never concatenates path segments on its own.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::KilnConfig;
use crate::manifest::{Project, ProjectManifest, MANIFEST_FILE};

/// Served runtime config file name inside the output directory.
pub const SERVED_CONFIG_FILE: &str = "config.json";

/// Resolved workspace paths.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    root: PathBuf,
    output_dir: PathBuf,
    modules_dir: PathBuf,
    cache_dir: PathBuf,
    source_dir: String,
    target_dir: String,
    descriptor_file: String,
}

impl WorkspaceLayout {
    /// Resolve the layout for `root` under the given configuration.
    #[must_use]
    pub fn new(root: &Path, config: &KilnConfig) -> Self {
        let output_dir = root.join(&config.workspace.output_dir);
        Self {
            root: root.to_path_buf(),
            modules_dir: output_dir.join(&config.workspace.modules_dir),
            cache_dir: root.join(&config.workspace.cache_dir),
            output_dir,
            source_dir: config.workspace.source_dir.clone(),
            target_dir: config.workspace.target_dir.clone(),
            descriptor_file: config.workspace.descriptor_file.clone(),
        }
    }

    /// Workspace root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory the assembled application is served from.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Directory holding hot-swappable unit artifacts.
    #[must_use]
    pub fn modules_dir(&self) -> &Path {
        &self.modules_dir
    }

    /// Directory holding persisted build fingerprints.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// The served runtime config file.
    #[must_use]
    pub fn served_config(&self) -> PathBuf {
        self.output_dir.join(SERVED_CONFIG_FILE)
    }

    /// A project's source tree.
    #[must_use]
    pub fn source_dir(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.source_dir)
    }

    /// A project's build tool descriptor file.
    #[must_use]
    pub fn build_descriptor(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.descriptor_file)
    }

    /// A project's manifest file.
    #[must_use]
    pub fn manifest_path(project_dir: &Path) -> PathBuf {
        project_dir.join(MANIFEST_FILE)
    }

    /// Where the build tool leaves a project's artifact.
    #[must_use]
    pub fn artifact_path(&self, project: &Project) -> PathBuf {
        project
            .dir
            .join(&self.target_dir)
            .join(project.manifest.artifact_file())
    }

    /// Where an application artifact is served from.
    #[must_use]
    pub fn served_artifact(&self, manifest: &ProjectManifest) -> PathBuf {
        self.output_dir.join(manifest.artifact_file())
    }

    /// Where a hot-swap unit artifact is served from.
    #[must_use]
    pub fn served_module(&self, manifest: &ProjectManifest) -> PathBuf {
        self.modules_dir.join(manifest.artifact_file())
    }

    /// Candidate project roots: immediate subdirectories of the workspace
    /// root that contain a manifest file, in sorted order. Hidden
    /// directories and the output directory are never considered.
    #[must_use]
    pub fn project_dirs(&self) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(root = %self.root.display(), %err, "cannot scan workspace root");
                return Vec::new();
            }
        };

        let mut dirs: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !n.starts_with('.'))
            })
            .filter(|p| *p != self.output_dir)
            .filter(|p| p.join(MANIFEST_FILE).is_file())
            .collect();
        dirs.sort();
        dirs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_project(root: &Path, name: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(MANIFEST_FILE),
            format!(
                r#"{{"name":"{name}","groupId":"g","artifactId":"{name}","version":"1","type":"library"}}"#
            ),
        )
        .unwrap();
    }

    #[test]
    fn test_discovery_skips_hidden_and_output() {
        let tmp = tempfile::tempdir().unwrap();
        seed_project(tmp.path(), "alpha");
        seed_project(tmp.path(), "beta");
        // looks like a project but lives in the served directory
        seed_project(tmp.path(), "output");
        seed_project(tmp.path(), ".hidden");
        // plain directory without a manifest
        std::fs::create_dir_all(tmp.path().join("docs")).unwrap();

        let layout = WorkspaceLayout::new(tmp.path(), &KilnConfig::default());
        let dirs = layout.project_dirs();
        let names: Vec<_> = dirs
            .iter()
            .map(|d| d.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_artifact_paths() {
        let tmp = tempfile::tempdir().unwrap();
        seed_project(tmp.path(), "alpha");
        let layout = WorkspaceLayout::new(tmp.path(), &KilnConfig::default());

        let manifest = ProjectManifest::load(&tmp.path().join("alpha"))
            .unwrap()
            .unwrap();
        let project = Project {
            dir: tmp.path().join("alpha"),
            manifest,
        };

        assert_eq!(
            layout.artifact_path(&project),
            tmp.path().join("alpha").join("target").join("alpha-1.jar")
        );
        assert_eq!(
            layout.served_module(&project.manifest),
            tmp.path()
                .join("output")
                .join("modules")
                .join("alpha-1.jar")
        );
    }
}
