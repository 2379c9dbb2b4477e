//! `kiln invalidate` - drop one project's cache entry.

use anyhow::{bail, Result};

use super::Context;

/// Invalidate the cache entry for `project` so it rebuilds next time.
pub fn run(ctx: &Context, project: &str) -> Result<()> {
    let graph = ctx.graph();
    if graph.project(project).is_none() {
        bail!("unknown project '{project}'");
    }

    ctx.cache.invalidate(project);
    println!("Cache entry for '{project}' invalidated; it will rebuild on the next pass.");
    Ok(())
}
