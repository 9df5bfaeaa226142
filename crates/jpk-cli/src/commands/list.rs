//! List command - list archive entries (files and directories).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use jpk_core::Archive;
use tracing::instrument;

use crate::output::{create_table, format_flags, format_mtime, format_size};
use crate::KeyOptions;

#[derive(ClapArgs)]
pub struct Args {
    /// Archive to list
    pub archive: PathBuf,

    #[command(flatten)]
    pub key: KeyOptions,
}

#[instrument(level = "info", name = "cmd::list", skip_all, fields(archive = %args.archive.display()))]
pub fn execute(args: &Args) -> Result<()> {
    let key_bytes = args.key.resolve()?;
    let mut archive = Archive::open(&args.archive, false, &key_bytes)
        .with_context(|| format!("failed to open archive {}", args.archive.display()))?;
    archive.load(false)?;

    let mut table = create_table();
    table.set_header(vec!["Type", "Size", "Mode", "Modified", "Flags", "Key"]);

    for dir in archive.directory_entries() {
        table.add_row(vec![
            "d".to_string(),
            "-".to_string(),
            format!("{:o}", dir.mode),
            format_mtime(dir.mtime),
            format_flags(false, dir.encryption, false),
            dir.key.clone(),
        ]);
    }

    for entry in archive.index_entries() {
        table.add_row(vec![
            "-".to_string(),
            format_size(u64::from(entry.size)),
            format!("{:o}", entry.mode),
            format_mtime(entry.mtime),
            format_flags(entry.gzip, entry.encryption, entry.hmac),
            entry.key.clone(),
        ]);
    }

    println!("{table}");
    Ok(())
}
