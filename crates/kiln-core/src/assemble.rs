//! Assembly of the served directory.
//!
//! The output directory is what the launched process actually runs from:
//! the application artifact at its root, every hot-swap unit artifact under
//! the modules subdirectory, and the served runtime config next to them.
//!
//! Every artifact copy is atomic from a reader's point of view: the bytes
//! are written to a temporary sibling in the destination directory, then
//! moved into the final name with a single rename. A live process polling
//! the path never observes a partially written file, only the old complete
//! artifact or the new one.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::config::RuntimeConfig;
use crate::graph::DependencyGraph;
use crate::manifest::ProjectRole;
use crate::workspace::WorkspaceLayout;

/// Assembly error.
#[derive(Debug, Error)]
pub enum AssembleError {
    /// An expected build artifact does not exist.
    #[error("artifact not found: {0}")]
    MissingArtifact(PathBuf),

    /// A copy or write failed.
    #[error("failed to assemble {path}: {source}")]
    Io {
        /// Destination that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// Copy `src` to `dst` atomically: write a temporary sibling, then rename
/// into place. The rename stays on one filesystem, so readers see either
/// the old file or the new file, never a torn one.
///
/// # Errors
///
/// Returns an error when `src` is missing or the copy fails.
pub fn copy_artifact(src: &Path, dst: &Path) -> Result<(), AssembleError> {
    if !src.exists() {
        return Err(AssembleError::MissingArtifact(src.to_path_buf()));
    }
    let parent = dst.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|source| AssembleError::Io {
        path: parent.to_path_buf(),
        source,
    })?;

    let stage = || -> io::Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        let mut reader = std::fs::File::open(src)?;
        io::copy(&mut reader, &mut tmp)?;
        tmp.as_file().sync_all()?;
        tmp.persist(dst).map_err(|err| err.error)?;
        Ok(())
    };
    stage().map_err(|source| AssembleError::Io {
        path: dst.to_path_buf(),
        source,
    })?;

    debug!(src = %src.display(), dst = %dst.display(), "artifact delivered");
    Ok(())
}

/// Write the served runtime config, pointing its `sources` at the modules
/// directory. If the application project ships its own `config.json`, that
/// file is taken as the base; otherwise the existing served config (or the
/// defaults) is reused, so operator edits like the port survive assembly.
fn write_served_config(
    layout: &WorkspaceLayout,
    graph: &DependencyGraph,
) -> Result<(), AssembleError> {
    let dst = layout.served_config();

    let base = graph
        .projects()
        .find(|(_, p)| p.manifest.role == ProjectRole::Application)
        .map(|(_, p)| p.dir.join("config.json"))
        .filter(|p| p.exists())
        .unwrap_or_else(|| dst.clone());
    let mut config = RuntimeConfig::load(&base);
    config.sources = vec![layout.modules_dir().display().to_string()];

    let body = serde_json::to_string_pretty(&config).map_err(|err| AssembleError::Io {
        path: dst.clone(),
        source: io::Error::other(err),
    })?;

    let stage = || -> io::Result<()> {
        let parent = dst.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        io::Write::write_all(&mut tmp, body.as_bytes())?;
        tmp.persist(&dst).map_err(|err| err.error)?;
        Ok(())
    };
    stage().map_err(|source| AssembleError::Io {
        path: dst.clone(),
        source,
    })?;

    debug!(path = %dst.display(), "served config written");
    Ok(())
}

/// Assemble the served directory from the current build artifacts.
///
/// # Errors
///
/// Returns an error when a required artifact is missing or a copy fails.
/// The application artifact is required; hot-swap units are copied for
/// every unit whose artifact exists, and a missing unit artifact is an
/// error as well (it means the unit was never built).
pub fn assemble(layout: &WorkspaceLayout, graph: &DependencyGraph) -> Result<(), AssembleError> {
    info!(output = %layout.output_dir().display(), "assembling served directory");

    std::fs::create_dir_all(layout.modules_dir()).map_err(|source| AssembleError::Io {
        path: layout.modules_dir().to_path_buf(),
        source,
    })?;

    for id in graph.order() {
        let Some(project) = graph.project(id) else {
            continue;
        };
        match project.manifest.role {
            ProjectRole::Application => copy_artifact(
                &layout.artifact_path(project),
                &layout.served_artifact(&project.manifest),
            )?,
            ProjectRole::HotSwapUnit => copy_artifact(
                &layout.artifact_path(project),
                &layout.served_module(&project.manifest),
            )?,
            // classpath libraries are linked into the application artifact
            // by the build tool, not served on their own
            ProjectRole::Library => {}
        }
    }

    write_served_config(layout, graph)
}
