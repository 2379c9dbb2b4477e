//! Project descriptors.
//!
//! Every project root in the workspace may carry a `project.json` manifest
//! declaring its identity, its role, and its dependencies on sibling
//! projects:
//!
//! ```json
//! {
//!   "name": "ModKit",
//!   "groupId": "works.example",
//!   "artifactId": "modkit",
//!   "version": "1.8.3",
//!   "type": "library",
//!   "module": { "id": "modkit-runtime" },
//!   "workspaceDependencies": [
//!     { "groupId": "works.example", "artifactId": "loader-api" }
//!   ]
//! }
//! ```
//!
//! The project's role is resolved exactly once at load time into
//! [`ProjectRole`]; the raw `module` block is never re-inspected at use
//! sites. Manifests are re-read at the start of every orchestration cycle so
//! edits to descriptors are picked up like any other change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::workspace::WorkspaceLayout;

/// Manifest file name inside a project root.
pub const MANIFEST_FILE: &str = "project.json";

/// What a project contributes to the running application.
///
/// Resolved once when the manifest is loaded: `application` descriptors are
/// always [`ProjectRole::Application`]; `library` descriptors become
/// [`ProjectRole::HotSwapUnit`] when they carry a `module` block, plain
/// [`ProjectRole::Library`] otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectRole {
    /// The launched entry point. Changes always require a relaunch.
    Application,
    /// A classpath library. The running process cannot replace it, so
    /// changes always require a relaunch.
    Library,
    /// A unit the live process can reload without restarting.
    HotSwapUnit,
}

impl std::fmt::Display for ProjectRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Application => write!(f, "application"),
            Self::Library => write!(f, "library"),
            Self::HotSwapUnit => write!(f, "hot-swap unit"),
        }
    }
}

/// A declared dependency on a sibling workspace project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRef {
    /// Namespace of the dependency.
    #[serde(default)]
    pub group_id: String,

    /// Artifact id of the dependency; the key into the workspace graph.
    pub artifact_id: String,

    /// Locally declared version, used only as a fallback when the
    /// dependency's own manifest cannot be resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Hot-swap unit metadata (`module` block).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleMeta {
    /// Identifier the live process knows this unit by. Falls back to the
    /// project's artifact id when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// In-memory representation of a project's `project.json`.
#[derive(Debug, Clone)]
pub struct ProjectManifest {
    /// Human-readable project name.
    pub name: String,
    /// Namespace id.
    pub group_id: String,
    /// Artifact id; unique within the workspace.
    pub artifact_id: String,
    /// Declared version.
    pub version: String,
    /// Resolved role.
    pub role: ProjectRole,
    /// Hot-swap unit metadata, present only for [`ProjectRole::HotSwapUnit`]
    /// (and for applications that also declared one).
    pub module: Option<ModuleMeta>,
    /// Optional override for the built artifact's file name.
    pub artifact: Option<String>,
    /// Dependencies on sibling workspace projects.
    pub workspace_deps: Vec<DependencyRef>,
}

/// Raw serde shape of the manifest file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    name: String,
    group_id: String,
    artifact_id: String,
    version: String,
    #[serde(rename = "type")]
    project_type: String,
    #[serde(default)]
    module: Option<ModuleMeta>,
    #[serde(default)]
    artifact: Option<String>,
    #[serde(default, alias = "workspace_dependencies")]
    workspace_dependencies: Vec<DependencyRef>,
}

/// Manifest loading error.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file exists but cannot be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path of the manifest file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The manifest file is not valid JSON or misses required fields.
    #[error("malformed {path}: {source}")]
    Parse {
        /// Path of the manifest file.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// The `type` field carries an unknown value.
    #[error("{path}: unknown project type '{value}'")]
    UnknownType {
        /// Path of the manifest file.
        path: PathBuf,
        /// The rejected value.
        value: String,
    },
}

impl ProjectManifest {
    /// Load the manifest from `project_dir`, returning `Ok(None)` when the
    /// directory has no manifest file.
    ///
    /// # Errors
    ///
    /// Returns an error for unreadable or malformed manifests; callers at
    /// the workspace level treat those as "skip this project with a
    /// warning", never as fatal.
    pub fn load(project_dir: &Path) -> Result<Option<Self>, ManifestError> {
        let path = project_dir.join(MANIFEST_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ManifestError::Io { path, source }),
        };

        let raw: RawManifest =
            serde_json::from_str(&content).map_err(|source| ManifestError::Parse {
                path: path.clone(),
                source,
            })?;

        let role = match raw.project_type.as_str() {
            "application" => ProjectRole::Application,
            "library" if raw.module.is_some() => ProjectRole::HotSwapUnit,
            "library" => ProjectRole::Library,
            other => {
                return Err(ManifestError::UnknownType {
                    path,
                    value: other.to_string(),
                })
            }
        };

        Ok(Some(Self {
            name: raw.name,
            group_id: raw.group_id,
            artifact_id: raw.artifact_id,
            version: raw.version,
            role,
            module: raw.module,
            artifact: raw.artifact,
            workspace_deps: raw.workspace_dependencies,
        }))
    }

    /// File name of the built artifact (`artifact` override, or
    /// `<artifactId>-<version>.jar`).
    #[must_use]
    pub fn artifact_file(&self) -> String {
        self.artifact
            .clone()
            .unwrap_or_else(|| format!("{}-{}.jar", self.artifact_id, self.version))
    }

    /// Identifier the live process knows this unit by.
    #[must_use]
    pub fn unit_id(&self) -> &str {
        self.module
            .as_ref()
            .and_then(|m| m.id.as_deref())
            .unwrap_or(&self.artifact_id)
    }

    /// Whether this manifest declares `artifact_id` as a dependency.
    #[must_use]
    pub fn depends_on(&self, artifact_id: &str) -> bool {
        self.workspace_deps
            .iter()
            .any(|d| d.artifact_id == artifact_id)
    }
}

/// A discovered workspace project: its root directory plus its manifest.
#[derive(Debug, Clone)]
pub struct Project {
    /// Absolute path of the project root.
    pub dir: PathBuf,
    /// The loaded manifest.
    pub manifest: ProjectManifest,
}

/// Discover and load every project in the workspace.
///
/// Scans the workspace root for immediate subdirectories containing a
/// manifest file. Malformed manifests are dropped with a warning; they never
/// abort discovery of the rest of the workspace.
#[must_use]
pub fn load_workspace(layout: &WorkspaceLayout) -> BTreeMap<String, Project> {
    let mut projects = BTreeMap::new();
    for dir in layout.project_dirs() {
        match ProjectManifest::load(&dir) {
            Ok(Some(manifest)) => {
                if let Some(previous) = projects.insert(
                    manifest.artifact_id.clone(),
                    Project { dir, manifest },
                ) {
                    warn!(
                        artifact_id = %previous.manifest.artifact_id,
                        dir = %previous.dir.display(),
                        "duplicate artifact id in workspace, keeping the later project"
                    );
                }
            }
            Ok(None) => {}
            Err(err) => warn!(dir = %dir.display(), %err, "skipping project"),
        }
    }
    projects
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_manifest(dir: &Path, body: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(MANIFEST_FILE), body).unwrap();
    }

    #[test]
    fn test_load_library() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(
            tmp.path(),
            r#"{
                "name": "Kit",
                "groupId": "works.example",
                "artifactId": "kit",
                "version": "1.2.3",
                "type": "library"
            }"#,
        );

        let manifest = ProjectManifest::load(tmp.path()).unwrap().unwrap();
        assert_eq!(manifest.artifact_id, "kit");
        assert_eq!(manifest.role, ProjectRole::Library);
        assert_eq!(manifest.artifact_file(), "kit-1.2.3.jar");
    }

    #[test]
    fn test_module_block_makes_hot_swap_unit() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(
            tmp.path(),
            r#"{
                "name": "App Modules",
                "groupId": "works.example",
                "artifactId": "app-modules",
                "version": "0.1.0",
                "type": "library",
                "module": { "id": "app-runtime" }
            }"#,
        );

        let manifest = ProjectManifest::load(tmp.path()).unwrap().unwrap();
        assert_eq!(manifest.role, ProjectRole::HotSwapUnit);
        assert_eq!(manifest.unit_id(), "app-runtime");
    }

    #[test]
    fn test_application_wins_over_module_block() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(
            tmp.path(),
            r#"{
                "name": "Launcher",
                "groupId": "works.example",
                "artifactId": "launcher",
                "version": "1.0.0",
                "type": "application",
                "module": {}
            }"#,
        );

        let manifest = ProjectManifest::load(tmp.path()).unwrap().unwrap();
        assert_eq!(manifest.role, ProjectRole::Application);
        // no module id declared, unit id falls back to the artifact id
        assert_eq!(manifest.unit_id(), "launcher");
    }

    #[test]
    fn test_missing_manifest_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(ProjectManifest::load(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn test_malformed_manifest_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "{ not json");
        assert!(matches!(
            ProjectManifest::load(tmp.path()),
            Err(ManifestError::Parse { .. })
        ));
    }

    #[test]
    fn test_unknown_type_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(
            tmp.path(),
            r#"{
                "name": "X",
                "groupId": "g",
                "artifactId": "x",
                "version": "1",
                "type": "plugin"
            }"#,
        );
        assert!(matches!(
            ProjectManifest::load(tmp.path()),
            Err(ManifestError::UnknownType { .. })
        ));
    }

    #[test]
    fn test_dependency_refs() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(
            tmp.path(),
            r#"{
                "name": "App",
                "groupId": "works.example",
                "artifactId": "app",
                "version": "2.0.0",
                "type": "application",
                "workspaceDependencies": [
                    { "groupId": "works.example", "artifactId": "kit", "version": "1.0.0" }
                ]
            }"#,
        );

        let manifest = ProjectManifest::load(tmp.path()).unwrap().unwrap();
        assert!(manifest.depends_on("kit"));
        assert!(!manifest.depends_on("other"));
        assert_eq!(manifest.workspace_deps[0].version.as_deref(), Some("1.0.0"));
    }
}
