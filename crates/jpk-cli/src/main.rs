mod commands;
mod exit_code;
mod output;

use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{add, create, extract, list, list_headers};

/// Command-line interface for JPK archives
#[derive(Parser)]
#[command(name = "jpk")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Create an empty archive
    jpk create backup.jpk

    # Add files with gzip + encryption + per-entry HMAC
    jpk add backup.jpk src/ README.md --gzip --encrypt --hmac --encryption-key-stdin

    # List entries
    jpk list backup.jpk --encryption-key-stdin

    # Extract, verifying per-entry HMACs
    jpk extract backup.jpk ./out --encryption-key-stdin --verify
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new, empty archive
    Create(create::Args),

    /// Append files, directories, or directory markers to an archive
    Add(add::Args),

    /// Extract every entry into a target directory
    Extract(extract::Args),

    /// List archive entries
    List(list::Args),

    /// List archive header records
    ListHeaders(list_headers::Args),
}

/// Key-acquisition options shared by every subcommand that touches the
/// cipher key: flag takes priority, then the environment variable, then
/// an interactive stdin prompt.
#[derive(Clone, Default, clap::Args)]
pub struct KeyOptions {
    /// Encryption key (insecure, prefer --encryption-key-stdin or JPK_ENCRYPTION_KEY)
    #[arg(long, env = "JPK_ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: Option<String>,

    /// Read the encryption key from stdin (single line)
    #[arg(long, conflicts_with = "encryption_key")]
    pub encryption_key_stdin: bool,
}

impl KeyOptions {
    /// Resolve the user key bytes. Archives with no encryption still
    /// derive a key from an empty byte string, so an absent key here is
    /// not an error.
    pub fn resolve(&self) -> Result<Vec<u8>> {
        if self.encryption_key_stdin {
            read_key_from_stdin()
        } else if let Some(ref key) = self.encryption_key {
            Ok(key.clone().into_bytes())
        } else {
            Ok(Vec::new())
        }
    }
}

fn read_key_from_stdin() -> Result<Vec<u8>> {
    if io::stdin().is_terminal() {
        bail!(
            "--encryption-key-stdin requires the key to be piped in.\n\
             Example: echo \"$SECRET\" | jpk list backup.jpk --encryption-key-stdin"
        );
    }
    let mut key = String::new();
    io::stdin().read_line(&mut key)?;
    let key = key.trim_end_matches(['\n', '\r']);
    if key.is_empty() {
        bail!("Encryption key from stdin is empty");
    }
    Ok(key.as_bytes().to_vec())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            let code = exit_code::categorize_error(&e);
            let args: Vec<String> = std::env::args().collect();
            let is_quiet = args.iter().any(|a| a == "-q" || a == "--quiet");
            if !is_quiet {
                eprintln!("Error: {e:#}");
            }
            ExitCode::from(code)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if !cli.quiet {
        setup_tracing(cli.verbose);
    }

    match cli.command {
        Commands::Create(args) => create::execute(&args),
        Commands::Add(args) => add::execute(&args),
        Commands::Extract(args) => extract::execute(&args),
        Commands::List(args) => list::execute(&args),
        Commands::ListHeaders(args) => list_headers::execute(&args),
    }
}

fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}

