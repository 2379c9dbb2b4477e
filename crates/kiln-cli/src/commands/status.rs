//! `kiln status` - per-project cache status.

use anyhow::Result;
use kiln_core::fingerprint::fingerprint;

use super::Context;

/// Print one line per project: artifact id, version, role, and whether the
/// cache considers it up to date.
pub fn run(ctx: &Context, mode: Option<String>) -> Result<()> {
    let graph = ctx.graph();
    if graph.is_empty() {
        println!("No projects found under {}", ctx.layout.root().display());
        return Ok(());
    }
    let mode = ctx.mode(mode);

    println!("Workspace: {}", ctx.layout.root().display());
    println!("Mode:      {mode}");
    println!();

    for id in graph.order() {
        let Some(project) = graph.project(id) else {
            continue;
        };
        let manifest = &project.manifest;
        let artifact = ctx.layout.artifact_path(project);

        let state = match ctx.cache.stored(id) {
            None => "stale (no cache entry)",
            Some(stored) => {
                if !artifact.exists() {
                    "stale (artifact missing)"
                } else if stored == fingerprint(&ctx.layout, project, &graph, &mode) {
                    "up to date"
                } else {
                    "stale (sources changed)"
                }
            }
        };

        println!(
            "  {:<24} {:<10} {:<14} {state}",
            id,
            manifest.version,
            manifest.role.to_string()
        );
    }
    Ok(())
}
