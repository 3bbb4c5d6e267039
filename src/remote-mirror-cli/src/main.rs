mod cli;
mod commands;
mod config;
mod manifest;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use remote_mirror::CMemoryReader;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::*;

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "remote_mirror=warn,rmirror=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Configure {
            default_manifest,
            show,
        } => commands::configure::handle(default_manifest, show),
        Commands::Memory(command) => run(cli.manifest, command),
    }
}

/// Load the image and run a memory command against it
fn run(manifest_path: Option<PathBuf>, command: MemoryCommand) -> Result<()> {
    let manifest_path = resolve_manifest(manifest_path, Config::load)?;
    let image = manifest::load_image(&manifest_path)?;

    // SAFETY: the image's callbacks are reentrant and never unwind, and
    // `image` outlives `reader` and every buffer read through it.
    let reader = unsafe { CMemoryReader::new(image.function_table()) }
        .context("Image does not describe a readable target")?;

    let result = match command {
        MemoryCommand::Info => commands::memory::handle_info(&reader, &image),
        MemoryCommand::Symbol { name } => commands::memory::handle_symbol(&reader, &name),
        MemoryCommand::Read { address, size, raw } => {
            commands::memory::handle_read(&reader, &address, size, raw)
        }
        MemoryCommand::String { address } => commands::memory::handle_string(&reader, &address),
        MemoryCommand::Pointer { address } => commands::memory::handle_pointer(&reader, &address),
    };

    let live = image.live_reads();
    if live != 0 {
        tracing::warn!(live, "Buffers were not released before exit");
    }

    result
}

/// Use the manifest from the command line, or the configured default.
/// `load_config` only runs when no manifest was given.
fn resolve_manifest(
    manifest: Option<PathBuf>,
    load_config: impl FnOnce() -> Result<Config>,
) -> Result<PathBuf> {
    if let Some(path) = manifest {
        return Ok(path);
    }

    let config = load_config()?;
    config.manifest().map(PathBuf::from).context(
        "No image manifest given. Pass --manifest or run `rmirror configure --default-manifest`",
    )
}
