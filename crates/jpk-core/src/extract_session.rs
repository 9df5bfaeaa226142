//! `extract()`: materialize every index/directory entry under a target
//! directory, guarding against keys that would escape it.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{instrument, warn};

use crate::archive::Archive;
use crate::error::{JpkError, Result};
use crate::pipeline::decode_entry;

pub struct ExtractOptions {
    pub verify_file_hmac: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            verify_file_hmac: true,
        }
    }
}

/// Reject a key whose basename is `.`, `..`, `~`, or whose resolved path
/// would land outside `target_dir`.
fn safe_join(target_dir: &Path, key: &str) -> Option<PathBuf> {
    let basename = key.rsplit('/').next().unwrap_or(key);
    if basename.is_empty() || basename == "." || basename == ".." || basename == "~" {
        return None;
    }
    if key.starts_with('/') || key.starts_with("~/") {
        return None;
    }
    if key.split('/').any(|seg| seg == ".." || seg == "~") {
        return None;
    }
    Some(target_dir.join(key))
}

#[instrument(level = "info", skip(archive, options), fields(target = %target_dir.display()))]
pub fn extract(archive: &mut Archive, target_dir: &Path, options: &ExtractOptions) -> Result<()> {
    if !archive.is_loaded() {
        archive.load(false)?;
    }
    fs::create_dir_all(target_dir)?;

    let mut made_dirs: HashSet<PathBuf> = HashSet::new();
    made_dirs.insert(target_dir.to_path_buf());

    let entries: Vec<_> = archive.index_entries().cloned().collect();
    for entry in &entries {
        let file_path = match safe_join(target_dir, &entry.key) {
            Some(p) => p,
            None => {
                warn!(key = %entry.key, "unsafe key, skipping entry");
                continue;
            }
        };

        if let Some(parent) = file_path.parent() {
            ensure_dir(parent, &mut made_dirs)?;
        }

        let window = archive.read_window(entry.offset, entry.size)?;
        let plaintext = decode_entry(
            window.into_inner(),
            entry.hmac,
            entry.hmac && options.verify_file_hmac,
            entry.encryption,
            entry.gzip,
            archive.cipher_key(),
            &entry.key,
        )
        .inspect_err(|e| {
            if matches!(e, JpkError::EntryHmacMismatch { .. }) {
                archive.poisoned.insert(entry.key.clone());
            }
        })?;

        let mut out = fs::File::create(&file_path)?;
        out.write_all(&plaintext)?;
        out.flush()?;
        set_mode(&file_path, entry.mode)?;
        set_times(&file_path, entry.mtime, entry.atime)?;
    }

    let mut dir_entries: Vec<_> = archive.directory_entries().cloned().collect();
    dir_entries.sort_by(|a, b| b.key.len().cmp(&a.key.len()));

    for entry in &dir_entries {
        let dir_path = match safe_join(target_dir, &entry.key) {
            Some(p) => p,
            None => {
                warn!(key = %entry.key, "unsafe directory key, skipping entry");
                continue;
            }
        };
        // `create_dir_all` both tolerates the entry already existing and
        // materializes any ancestor that neither the file pass above nor
        // an earlier (deeper) directory entry has created yet — e.g. a
        // bare `a/b/c` directory marker with no file ever written under
        // `a` or `a/b`.
        fs::create_dir_all(&dir_path)?;
        set_mode(&dir_path, entry.mode)?;
        set_times(&dir_path, entry.mtime, entry.atime)?;
        made_dirs.insert(dir_path);
    }

    Ok(())
}

fn ensure_dir(path: &Path, made: &mut HashSet<PathBuf>) -> Result<()> {
    if made.contains(path) || path.exists() {
        made.insert(path.to_path_buf());
        return Ok(());
    }
    fs::create_dir_all(path)?;
    made.insert(path.to_path_buf());
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u16) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(u32::from(mode)))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u16) -> Result<()> {
    Ok(())
}

/// Converts a millisecond timestamp to `(seconds, nanos)` so callers keep
/// millisecond precision instead of truncating to whole seconds.
fn millis_to_unix_parts(millis: f64) -> (i64, u32) {
    let secs = (millis / 1000.0).floor();
    let rem_millis = millis - secs * 1000.0;
    (secs as i64, (rem_millis * 1_000_000.0).round() as u32)
}

fn set_times(path: &Path, mtime_millis: f64, atime_millis: f64) -> Result<()> {
    let (mtime_secs, mtime_nanos) = millis_to_unix_parts(mtime_millis);
    let (atime_secs, atime_nanos) = millis_to_unix_parts(atime_millis);
    let mtime = filetime::FileTime::from_unix_time(mtime_secs, mtime_nanos);
    let atime = filetime::FileTime::from_unix_time(atime_secs, atime_nanos);
    filetime::set_file_times(path, atime, mtime).map_err(Into::into)
}
