//! `kiln assemble` - rebuild the served directory.

use anyhow::{bail, Context as _, Result};

use super::Context;

/// Assemble the served directory from the current build artifacts.
pub fn run(ctx: &Context) -> Result<()> {
    let graph = ctx.graph();
    if graph.is_empty() {
        bail!("no projects found under {}", ctx.layout.root().display());
    }

    kiln_core::assemble::assemble(&ctx.layout, &graph)
        .context("failed to assemble the served directory")?;
    println!("Assembled {}", ctx.layout.output_dir().display());
    Ok(())
}
