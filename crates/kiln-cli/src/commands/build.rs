//! `kiln build` - full workspace build honoring the cache.

use anyhow::{bail, Context as _, Result};
use kiln_core::builder::CommandBuildRunner;
use kiln_core::hooks::BuildHook;
use kiln_core::orchestrate::{Orchestrator, RebuildOptions};

use super::Context;

/// Build every project in dependency order.
pub fn run(ctx: &Context, clean: bool, skip_tests: bool, mode: Option<String>) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    rt.block_on(async {
        let graph = ctx.graph();
        if graph.is_empty() {
            bail!(
                "no projects found under {}",
                ctx.layout.root().display()
            );
        }

        if clean {
            ctx.cache.clear()?;
            println!("Build cache cleared.");
        }

        let runner = CommandBuildRunner::new(ctx.config.builder.clone());
        let hooks: Vec<Box<dyn BuildHook>> = Vec::new();
        let orchestrator = Orchestrator::new(&ctx.layout, &ctx.cache, &runner, &hooks);

        let opts = RebuildOptions {
            mode: ctx.mode(mode),
            skip_tests,
            clean,
        };
        let summary = orchestrator
            .build_workspace(&graph, &opts)
            .await
            .context("workspace build failed")?;

        println!(
            "Build complete: {} built, {} up to date.",
            summary.built.len(),
            summary.skipped.len()
        );
        Ok(())
    })
}
