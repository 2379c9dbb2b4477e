//! `kiln watch` - the live-reload pipeline.

use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context as _, Result};
use kiln_core::builder::CommandBuildRunner;
use kiln_core::watch::{WatchOptions, Watcher};
use tracing::info;

use super::Context;

/// Build, launch, and keep rebuilding on change until Ctrl-C.
pub fn run(
    ctx: Context,
    clean: bool,
    with_tests: bool,
    mode: Option<String>,
    poll: Option<Duration>,
    debounce: Option<Duration>,
) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    rt.block_on(async {
        let opts = WatchOptions {
            poll_interval: poll.unwrap_or(ctx.config.watch.poll_interval),
            debounce: debounce.unwrap_or(ctx.config.watch.debounce),
            mode: ctx.mode(mode),
            skip_tests: !with_tests,
            clean,
        };

        let runner = CommandBuildRunner::new(ctx.config.builder.clone());
        let mut watcher = Watcher::new(
            ctx.config,
            ctx.layout,
            ctx.cache,
            runner,
            Vec::new(),
        );

        // Ctrl-C sets the stop flag; the loop notices it at the top of the
        // next iteration and shuts the supervised process down gracefully.
        let shutdown = watcher.shutdown_handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping after this cycle");
                shutdown.store(true, Ordering::Relaxed);
            }
        });

        watcher.run(&opts).await.context("watch session failed")
    })
}
