//! List-headers command - dump every Header record in the archive.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use jpk_core::{Archive, HeaderValue};
use tracing::instrument;

use crate::output::create_table;
use crate::KeyOptions;

#[derive(ClapArgs)]
pub struct Args {
    /// Archive to inspect
    pub archive: PathBuf,

    #[command(flatten)]
    pub key: KeyOptions,
}

#[instrument(level = "info", name = "cmd::list_headers", skip_all, fields(archive = %args.archive.display()))]
pub fn execute(args: &Args) -> Result<()> {
    // Header values themselves are never encrypted, but loading the
    // archive also decrypts index/directory keys, so the right key is
    // still needed for an encrypted archive to parse cleanly.
    let key_bytes = args.key.resolve()?;
    let mut archive = Archive::open(&args.archive, false, &key_bytes)
        .with_context(|| format!("failed to open archive {}", args.archive.display()))?;
    archive.load(false)?;

    let mut table = create_table();
    table.set_header(vec!["Key", "Value"]);

    for (key, value) in archive.headers_iter() {
        let rendered = match value {
            HeaderValue::U8(v) => v.to_string(),
            HeaderValue::Hmac(tag) => hex_string(tag),
            HeaderValue::Raw(bytes) => hex_string(bytes),
        };
        table.add_row(vec![key.to_string(), rendered]);
    }

    println!("{table}");
    Ok(())
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
