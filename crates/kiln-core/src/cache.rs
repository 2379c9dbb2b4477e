//! The persistent build cache.
//!
//! One JSON file per project, `<cache_dir>/<artifactId>.json`, holding the
//! fingerprint recorded after the project's last successful build:
//!
//! ```json
//! { "fingerprint": "<64 hex chars>" }
//! ```
//!
//! The store is disposable state: it carries no schema version, a corrupt
//! entry behaves exactly like a missing one, and deleting the directory is
//! always safe (it merely costs a full rebuild). The cache is an explicit
//! value handed to every component that needs it - there is no ambient
//! global store.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::fingerprint::fingerprint;
use crate::graph::DependencyGraph;
use crate::manifest::Project;
use crate::workspace::WorkspaceLayout;

/// Persisted cache record.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    fingerprint: String,
}

/// Cache store error.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The entry or the cache directory could not be written.
    #[error("failed to write cache entry at {path}: {source}")]
    Write {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The cache directory could not be removed.
    #[error("failed to clear cache directory {path}: {source}")]
    Clear {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The entry could not be serialized.
    #[error("failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The fingerprint store.
#[derive(Debug, Clone)]
pub struct BuildCache {
    dir: PathBuf,
}

impl BuildCache {
    /// A cache store rooted at `dir`. The directory is created lazily on
    /// the first write.
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// The cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, artifact_id: &str) -> PathBuf {
        self.dir.join(format!("{artifact_id}.json"))
    }

    /// The stored fingerprint for `artifact_id`, or `None` when absent or
    /// unreadable (corruption is a cache miss, never an error).
    #[must_use]
    pub fn stored(&self, artifact_id: &str) -> Option<String> {
        let path = self.entry_path(artifact_id);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<CacheEntry>(&content) {
            Ok(entry) => Some(entry.fingerprint),
            Err(err) => {
                warn!(artifact_id, %err, "corrupt cache entry, treating as stale");
                None
            }
        }
    }

    /// Whether `project` is up to date: the artifact exists on disk *and*
    /// the stored fingerprint matches the freshly computed one. A missing
    /// artifact always forces a rebuild, even when fingerprints match - the
    /// cache never claims an artifact exists when it does not.
    #[must_use]
    pub fn is_up_to_date(
        &self,
        layout: &WorkspaceLayout,
        project: &Project,
        graph: &DependencyGraph,
        mode: &str,
        artifact_path: &Path,
    ) -> bool {
        if !artifact_path.exists() {
            return false;
        }
        let Some(stored) = self.stored(&project.manifest.artifact_id) else {
            return false;
        };
        stored == fingerprint(layout, project, graph, mode)
    }

    /// Persist the current fingerprint for `project`. Call only after the
    /// external build reported success.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be written.
    pub fn mark_built(
        &self,
        layout: &WorkspaceLayout,
        project: &Project,
        graph: &DependencyGraph,
        mode: &str,
    ) -> Result<(), CacheError> {
        let digest = fingerprint(layout, project, graph, mode);
        std::fs::create_dir_all(&self.dir).map_err(|source| CacheError::Write {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.entry_path(&project.manifest.artifact_id);
        let body = serde_json::to_string_pretty(&CacheEntry { fingerprint: digest })?;
        std::fs::write(&path, body + "\n").map_err(|source| CacheError::Write { path, source })
    }

    /// Delete the stored entry for `artifact_id`. Idempotent.
    pub fn invalidate(&self, artifact_id: &str) {
        let path = self.entry_path(artifact_id);
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(artifact_id, "cache entry invalidated"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(artifact_id, %err, "failed to delete cache entry"),
        }
    }

    /// Cascade invalidation: after `rebuilt_id` was rebuilt, drop the cache
    /// entry of every project that declares it as a workspace dependency,
    /// so dependents rebuild on the next pass and pick up the new output.
    /// Returns the invalidated ids for queueing.
    pub fn invalidate_dependents(
        &self,
        rebuilt_id: &str,
        graph: &DependencyGraph,
    ) -> Vec<String> {
        let mut invalidated = Vec::new();
        for dependent in graph.direct_dependents(rebuilt_id) {
            self.invalidate(dependent);
            invalidated.push(dependent.to_string());
        }
        invalidated
    }

    /// Wipe the entire store (forced full rebuild).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be removed.
    pub fn clear(&self) -> Result<(), CacheError> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Clear {
                path: self.dir.clone(),
                source,
            }),
        }
    }

    /// One change-detection pass: the artifact ids of every project whose
    /// fresh fingerprint differs from the stored entry, or with no entry at
    /// all. Artifact existence is deliberately not checked here - the
    /// watcher distinguishes "stale" from "missing" itself.
    #[must_use]
    pub fn scan_changed(
        &self,
        layout: &WorkspaceLayout,
        graph: &DependencyGraph,
        mode: &str,
    ) -> Vec<String> {
        let mut stale = Vec::new();
        for id in graph.order() {
            let Some(project) = graph.project(id) else {
                continue;
            };
            let current = fingerprint(layout, project, graph, mode);
            if self.stored(id).as_deref() != Some(current.as_str()) {
                stale.push(id.clone());
            }
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::config::KilnConfig;
    use crate::manifest::{load_workspace, MANIFEST_FILE};

    struct Fixture {
        _tmp: tempfile::TempDir,
        layout: WorkspaceLayout,
        cache: BuildCache,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let layout = WorkspaceLayout::new(tmp.path(), &KilnConfig::default());
            let cache = BuildCache::new(layout.cache_dir().to_path_buf());
            Self {
                _tmp: tmp,
                layout,
                cache,
            }
        }

        fn add_project(&self, id: &str, deps: &[&str]) {
            let dir = self.layout.root().join(id);
            fs::create_dir_all(dir.join("src")).unwrap();
            fs::create_dir_all(dir.join("target")).unwrap();
            let deps_json: Vec<String> = deps
                .iter()
                .map(|d| format!(r#"{{"groupId":"g","artifactId":"{d}"}}"#))
                .collect();
            fs::write(
                dir.join(MANIFEST_FILE),
                format!(
                    r#"{{"name":"{id}","groupId":"g","artifactId":"{id}","version":"1","type":"library","workspaceDependencies":[{}]}}"#,
                    deps_json.join(",")
                ),
            )
            .unwrap();
            fs::write(dir.join("src").join("lib.java"), format!("class {id} {{}}")).unwrap();
        }

        fn graph(&self) -> DependencyGraph {
            DependencyGraph::resolve(load_workspace(&self.layout))
        }

        fn artifact(&self, id: &str) -> PathBuf {
            let path = self
                .layout
                .root()
                .join(id)
                .join("target")
                .join(format!("{id}-1.jar"));
            fs::write(&path, b"jar bytes").unwrap();
            path
        }
    }

    #[test]
    fn test_mark_built_then_up_to_date() {
        let fx = Fixture::new();
        fx.add_project("a", &[]);
        let graph = fx.graph();
        let project = graph.project("a").unwrap();
        let artifact = fx.artifact("a");

        assert!(!fx.cache.is_up_to_date(&fx.layout, project, &graph, "local", &artifact));
        fx.cache.mark_built(&fx.layout, project, &graph, "local").unwrap();
        assert!(fx.cache.is_up_to_date(&fx.layout, project, &graph, "local", &artifact));
    }

    #[test]
    fn test_missing_artifact_forces_rebuild() {
        let fx = Fixture::new();
        fx.add_project("a", &[]);
        let graph = fx.graph();
        let project = graph.project("a").unwrap();
        let artifact = fx.artifact("a");

        fx.cache.mark_built(&fx.layout, project, &graph, "local").unwrap();
        fs::remove_file(&artifact).unwrap();
        // fingerprint still matches, but the artifact is gone
        assert!(!fx.cache.is_up_to_date(&fx.layout, project, &graph, "local", &artifact));
    }

    #[test]
    fn test_source_edit_goes_stale() {
        let fx = Fixture::new();
        fx.add_project("a", &[]);
        let graph = fx.graph();
        let project = graph.project("a").unwrap();
        let artifact = fx.artifact("a");

        fx.cache.mark_built(&fx.layout, project, &graph, "local").unwrap();
        fs::write(
            fx.layout.root().join("a").join("src").join("lib.java"),
            "class a { int edited; }",
        )
        .unwrap();
        assert!(!fx.cache.is_up_to_date(&fx.layout, project, &graph, "local", &artifact));
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let fx = Fixture::new();
        fx.add_project("a", &[]);
        let graph = fx.graph();
        let project = graph.project("a").unwrap();
        let artifact = fx.artifact("a");

        fx.cache.mark_built(&fx.layout, project, &graph, "local").unwrap();
        fs::write(fx.cache.entry_path("a"), "not json at all").unwrap();
        assert!(fx.cache.stored("a").is_none());
        assert!(!fx.cache.is_up_to_date(&fx.layout, project, &graph, "local", &artifact));
    }

    #[test]
    fn test_invalidate_is_idempotent() {
        let fx = Fixture::new();
        fx.add_project("a", &[]);
        let graph = fx.graph();
        fx.cache
            .mark_built(&fx.layout, graph.project("a").unwrap(), &graph, "local")
            .unwrap();

        fx.cache.invalidate("a");
        assert!(fx.cache.stored("a").is_none());
        // second delete of a missing entry is a no-op
        fx.cache.invalidate("a");
    }

    #[test]
    fn test_invalidate_dependents_cascades() {
        let fx = Fixture::new();
        fx.add_project("a", &[]);
        fx.add_project("b", &["a"]);
        fx.add_project("c", &["b"]);
        let graph = fx.graph();
        for id in ["a", "b", "c"] {
            fx.cache
                .mark_built(&fx.layout, graph.project(id).unwrap(), &graph, "local")
                .unwrap();
        }

        let invalidated = fx.cache.invalidate_dependents("a", &graph);
        assert_eq!(invalidated, vec!["b"]);
        assert!(fx.cache.stored("a").is_some());
        assert!(fx.cache.stored("b").is_none());
        assert!(fx.cache.stored("c").is_some());
    }

    #[test]
    fn test_scan_changed_reports_stale_set() {
        let fx = Fixture::new();
        fx.add_project("a", &[]);
        fx.add_project("b", &["a"]);
        let graph = fx.graph();
        for id in ["a", "b"] {
            fx.cache
                .mark_built(&fx.layout, graph.project(id).unwrap(), &graph, "local")
                .unwrap();
        }
        assert!(fx.cache.scan_changed(&fx.layout, &graph, "local").is_empty());

        fs::write(
            fx.layout.root().join("a").join("src").join("lib.java"),
            "class a { int edited; }",
        )
        .unwrap();
        assert_eq!(fx.cache.scan_changed(&fx.layout, &graph, "local"), vec!["a"]);
    }

    #[test]
    fn test_clear_removes_everything() {
        let fx = Fixture::new();
        fx.add_project("a", &[]);
        let graph = fx.graph();
        fx.cache
            .mark_built(&fx.layout, graph.project("a").unwrap(), &graph, "local")
            .unwrap();

        fx.cache.clear().unwrap();
        assert!(fx.cache.stored("a").is_none());
        assert!(!fx.cache.dir().exists());
        // clearing an already-missing store is fine
        fx.cache.clear().unwrap();
    }
}
