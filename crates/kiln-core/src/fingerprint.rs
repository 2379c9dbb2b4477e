//! Content fingerprints over a project's build-relevant inputs.
//!
//! A fingerprint is a single SHA-256 hex digest fed, in a fixed order, with:
//!
//! 1. every regular file under the project's source tree, in lexicographic
//!    path order - raw bytes followed by the file's base name, so a
//!    rename-without-content-change still changes the digest
//! 2. the project manifest and the build tool descriptor, verbatim
//! 3. the *resolved* version of every declared workspace dependency - read
//!    from the dependency's own manifest, so a dependency version bump
//!    invalidates dependents whose own files are untouched
//! 4. the active build mode string
//!
//! Because the inputs are sorted before hashing, identical trees,
//! descriptors, resolved versions and mode always produce the identical
//! digest, independent of filesystem iteration order. Unreadable files are
//! skipped; fingerprinting is best-effort and never fails a cycle.

use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use crate::graph::DependencyGraph;
use crate::manifest::Project;
use crate::workspace::WorkspaceLayout;

/// Directory names that never contribute to a fingerprint, at any depth.
pub const IGNORED_DIRS: &[&str] = &["target", ".git", ".idea", "node_modules", "__pycache__"];

/// File names that never contribute to a fingerprint.
pub const IGNORED_FILES: &[&str] = &[".DS_Store"];

/// Version fed into the digest when a dependency declares no version and its
/// manifest cannot be resolved.
const UNKNOWN_VERSION: &str = "unknown";

/// Compute the fingerprint of `project` under the given build `mode`.
#[must_use]
pub fn fingerprint(
    layout: &WorkspaceLayout,
    project: &Project,
    graph: &DependencyGraph,
    mode: &str,
) -> String {
    let mut hasher = Sha256::new();

    hash_tree(&layout.source_dir(&project.dir), &mut hasher);

    hash_file(&WorkspaceLayout::manifest_path(&project.dir), &mut hasher);
    hash_file(&layout.build_descriptor(&project.dir), &mut hasher);

    let mut deps = project.manifest.workspace_deps.clone();
    deps.sort_by(|a, b| a.artifact_id.cmp(&b.artifact_id));
    for dep in &deps {
        let resolved = graph
            .project(&dep.artifact_id)
            .map(|p| p.manifest.version.as_str())
            .or(dep.version.as_deref())
            .unwrap_or(UNKNOWN_VERSION);
        hasher.update(format!(
            "dep:{}:{}:{}",
            dep.group_id, dep.artifact_id, resolved
        ));
    }

    hasher.update(format!("mode:{mode}"));

    format!("{:x}", hasher.finalize())
}

/// Feed every regular file under `dir` into the hasher, sorted, skipping the
/// ignore lists.
fn hash_tree(dir: &Path, hasher: &mut Sha256) {
    if !dir.exists() {
        return;
    }

    let mut files: Vec<_> = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            if e.file_type().is_dir() {
                !IGNORED_DIRS.contains(&name.as_ref())
            } else {
                !IGNORED_FILES.contains(&name.as_ref())
            }
        })
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();

    for path in files {
        hash_file(&path, hasher);
    }
}

/// Feed one file's bytes plus its base name into the hasher. Missing or
/// unreadable files are skipped.
fn hash_file(path: &Path, hasher: &mut Sha256) {
    let mut file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                debug!(path = %path.display(), %err, "skipping unreadable file");
            }
            return;
        }
    };
    if io::copy(&mut file, hasher).is_err() {
        debug!(path = %path.display(), "read failed mid-file, fingerprint degraded");
        return;
    }
    if let Some(name) = path.file_name() {
        hasher.update(name.to_string_lossy().as_bytes());
    }
}
