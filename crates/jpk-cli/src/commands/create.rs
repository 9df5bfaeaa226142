//! Create command - initialize a new, empty archive.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use jpk_core::Archive;
use tracing::instrument;

#[derive(ClapArgs)]
pub struct Args {
    /// Path of the archive to create
    pub archive: PathBuf,
}

#[instrument(level = "info", name = "cmd::create", skip_all, fields(archive = %args.archive.display()))]
pub fn execute(args: &Args) -> Result<()> {
    let _archive = Archive::open(&args.archive, true, b"")
        .with_context(|| format!("failed to create archive {}", args.archive.display()))?;
    println!("created {}", args.archive.display());
    Ok(())
}
