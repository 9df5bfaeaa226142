//! Extract command - materialize every entry under a target directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use jpk_core::{Archive, ExtractOptions};
use tracing::instrument;

use crate::KeyOptions;

#[derive(ClapArgs)]
pub struct Args {
    /// Archive to extract from
    pub archive: PathBuf,

    /// Directory to extract into (created if missing)
    pub target_dir: PathBuf,

    /// Verify each entry's HMAC tag, failing that entry on mismatch
    #[arg(short = 'V', long)]
    pub verify: bool,

    #[command(flatten)]
    pub key: KeyOptions,
}

#[instrument(level = "info", name = "cmd::extract", skip_all, fields(archive = %args.archive.display(), target = %args.target_dir.display()))]
pub fn execute(args: &Args) -> Result<()> {
    let key_bytes = args.key.resolve()?;
    let mut archive = Archive::open(&args.archive, false, &key_bytes)
        .with_context(|| format!("failed to open archive {}", args.archive.display()))?;
    archive.load(false)?;

    let options = ExtractOptions {
        verify_file_hmac: args.verify,
    };
    jpk_core::extract(&mut archive, &args.target_dir, &options)
        .context("failed to extract archive")?;

    println!("extracted {} into {}", args.archive.display(), args.target_dir.display());
    Ok(())
}
