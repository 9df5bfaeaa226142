//! Add command - append files, directories, or directory markers to an
//! archive.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use jpk_core::{Archive, AddEntry, AddOptions};
use tracing::instrument;

use crate::KeyOptions;

#[derive(ClapArgs)]
pub struct Args {
    /// Archive to append to
    pub archive: PathBuf,

    /// Paths to add. Regular files are streamed in; directories are
    /// walked recursively unless --directories is given.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Key prefix prepended to every entry
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// Gzip-compress entry bodies
    #[arg(short = 'z', long)]
    pub gzip: bool,

    /// Encrypt entry bodies and keys with AES-256-CTR
    #[arg(short = 'e', long)]
    pub encrypt: bool,

    /// Append an HMAC-SHA256 tag to each entry body
    #[arg(short = 'H', long)]
    pub hmac: bool,

    /// Recompute and store the meta HMAC after writing
    #[arg(short = 'M', long)]
    pub meta_hmac: bool,

    /// Treat `paths` as logical directory keys instead of filesystem
    /// paths: each one becomes an empty DirectoryEntry
    #[arg(long = "directories", alias = "dir")]
    pub directories: bool,

    #[command(flatten)]
    pub key: KeyOptions,
}

#[instrument(level = "info", name = "cmd::add", skip_all, fields(archive = %args.archive.display(), count = args.paths.len()))]
pub fn execute(args: &Args) -> Result<()> {
    let key_bytes = args.key.resolve()?;
    let mut archive = Archive::open(&args.archive, false, &key_bytes)
        .with_context(|| format!("failed to open archive {}", args.archive.display()))?;

    let entries = args
        .paths
        .iter()
        .map(|p| {
            if args.directories {
                AddEntry::directory(p.to_string_lossy().into_owned())
            } else {
                AddEntry::path(p.clone())
            }
        })
        .collect();

    let options = AddOptions {
        prefix: args.prefix.clone(),
        gzip: args.gzip,
        encryption: args.encrypt,
        hmac: args.hmac,
    };

    jpk_core::add(&mut archive, entries, &options)
        .context("failed to append entries to archive")?;

    if args.meta_hmac {
        archive.add_meta_hmac().context("failed to store meta HMAC")?;
    }

    println!("added {} entries to {}", args.paths.len(), args.archive.display());
    Ok(())
}
