//! kiln - incremental build and live-reload watcher for monorepo
//! workspaces.
//!
//! CLI over kiln-core: build the workspace in dependency order with a
//! content-addressed build cache, inspect and invalidate cache entries, and
//! run the watch loop that hot-swaps or relaunches the live application as
//! sources change.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;

/// kiln - incremental build and live-reload watcher
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Workspace root directory
    #[arg(short = 'C', long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file, relative to the workspace root
    #[arg(long, default_value = "kiln.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build every project in dependency order, honoring the build cache
    Build {
        /// Clear the cache and force a full rebuild
        #[arg(long)]
        clean: bool,

        /// Skip project tests
        #[arg(long)]
        skip_tests: bool,

        /// Override the configured build mode
        #[arg(long)]
        mode: Option<String>,
    },

    /// Build, launch, and rebuild on change (hot-swap or relaunch)
    Watch {
        /// Clear the cache and force a full initial rebuild
        #[arg(long)]
        clean: bool,

        /// Run project tests during rebuilds (skipped by default)
        #[arg(long)]
        with_tests: bool,

        /// Override the configured build mode
        #[arg(long)]
        mode: Option<String>,

        /// Poll interval, e.g. "2s" or "500ms"
        #[arg(long, value_parser = humantime::parse_duration)]
        poll: Option<Duration>,

        /// Settle time after a change before rebuilding
        #[arg(long, value_parser = humantime::parse_duration)]
        debounce: Option<Duration>,
    },

    /// Show the cache status of every project
    Status {
        /// Override the configured build mode
        #[arg(long)]
        mode: Option<String>,
    },

    /// Drop one project's cache entry so it rebuilds next time
    Invalidate {
        /// Artifact id of the project
        project: String,
    },

    /// Rebuild the served directory from the current artifacts
    Assemble,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log level")?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let ctx = commands::Context::load(&cli.workspace, &cli.config)?;

    match cli.command {
        Commands::Build {
            clean,
            skip_tests,
            mode,
        } => commands::build::run(&ctx, clean, skip_tests, mode),
        Commands::Watch {
            clean,
            with_tests,
            mode,
            poll,
            debounce,
        } => commands::watch::run(ctx, clean, with_tests, mode, poll, debounce),
        Commands::Status { mode } => commands::status::run(&ctx, mode),
        Commands::Invalidate { project } => commands::invalidate::run(&ctx, &project),
        Commands::Assemble => commands::assemble::run(&ctx),
    }
}
