//! `add()`: append entries (files, directories, in-memory buffers) to an
//! archive as a single Datablock + Directory + Index grouping.

use std::collections::VecDeque;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{instrument, warn};

use crate::archive::Archive;
use crate::block::{write_directory_record, write_index_record, FLAG_ENCRYPTION, FLAG_GZIP, FLAG_HMAC, KEY_MAX_SIZE};
use crate::crypto::{self, CipherKey};
use crate::error::{JpkError, Result};

/// Recursive directory walks never descend past this many levels, as a
/// backstop against pathological or cyclic filesystem trees.
const MAX_WALK_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub struct AddOptions {
    pub prefix: String,
    pub gzip: bool,
    pub encryption: bool,
    pub hmac: bool,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            gzip: false,
            encryption: false,
            hmac: false,
        }
    }
}

pub enum Source {
    /// A path on disk: a regular file is streamed in, a directory is
    /// walked recursively.
    Path(PathBuf),
    /// An in-memory buffer with an explicit key, defaulting to mode
    /// `0o644` and the current time.
    Memory { key: String, bytes: Vec<u8> },
    /// An explicit directory marker with no backing filesystem path:
    /// records a `DirectoryEntry` for `key` and nothing else.
    Directory { key: String },
}

pub struct AddEntry {
    pub source: Source,
    /// Overrides the session-wide default for this entry alone.
    pub gzip: Option<bool>,
    pub encryption: Option<bool>,
    pub hmac: Option<bool>,
}

impl AddEntry {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::Path(path.into()),
            gzip: None,
            encryption: None,
            hmac: None,
        }
    }

    pub fn directory(key: impl Into<String>) -> Self {
        Self {
            source: Source::Directory { key: key.into() },
            gzip: None,
            encryption: None,
            hmac: None,
        }
    }

    pub fn memory(key: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            source: Source::Memory {
                key: key.into(),
                bytes: bytes.into(),
            },
            gzip: None,
            encryption: None,
            hmac: None,
        }
    }
}

struct QueuedFile {
    key: String,
    bytes: FileBytes,
    mode: u16,
    mtime: f64,
    atime: f64,
    gzip: bool,
    encryption: bool,
    hmac: bool,
}

enum FileBytes {
    OnDisk(PathBuf),
    InMemory(Vec<u8>),
}

struct QueuedDir {
    key: String,
    mode: u16,
    mtime: f64,
    atime: f64,
}

fn now_millis() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as f64
}

fn join_key(prefix: &str, rest: &str) -> String {
    if prefix.is_empty() {
        rest.to_string()
    } else if prefix.ends_with('/') {
        format!("{prefix}{rest}")
    } else {
        format!("{prefix}/{rest}")
    }
}

fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.starts_with('/') || prefix.starts_with("~/") || prefix == "~" {
        return Err(JpkError::InvalidPrefix {
            prefix: prefix.to_string(),
        });
    }
    if prefix.split('/').any(|seg| seg == ".." || seg == "~") {
        return Err(JpkError::InvalidPrefix {
            prefix: prefix.to_string(),
        });
    }
    Ok(())
}

fn check_key_len(key: &str) -> Result<()> {
    if key.len() >= KEY_MAX_SIZE {
        return Err(JpkError::KeyTooLarge {
            key: key.to_string(),
            len: key.len(),
            max: KEY_MAX_SIZE,
        });
    }
    Ok(())
}

/// Append `entries` to `archive` as one Datablock + Directory + Index
/// grouping, per the container's append algorithm.
#[instrument(level = "info", skip(archive, entries), fields(count = entries.len()))]
pub fn add(archive: &mut Archive, entries: Vec<AddEntry>, options: &AddOptions) -> Result<()> {
    validate_prefix(&options.prefix)?;

    if !archive.is_loaded() {
        archive.load(false)?;
    }
    archive.add_core_headers()?;

    let (files, dirs) = collect_entries(entries, options)?;

    let mut placeholder = Vec::new();
    crate::block::write_datablock_prelude(&mut placeholder, 0, 0)?;
    let prelude_offset = archive.append_bytes(&placeholder)?;
    let data_start = archive.eof();

    let mut recorded: Vec<(String, u32, u32, u16, f64, f64, bool, bool, bool)> =
        Vec::with_capacity(files.len());

    for f in &files {
        let plaintext = match &f.bytes {
            FileBytes::OnDisk(path) => fs::read(path)?,
            FileBytes::InMemory(bytes) => bytes.clone(),
        };
        let encoded = encode_pipeline(&plaintext, f.gzip, f.encryption, f.hmac, archive.cipher_key())?;
        let offset = archive.append_bytes(&encoded)?;
        recorded.push((
            f.key.clone(),
            offset as u32,
            encoded.len() as u32,
            f.mode,
            f.mtime,
            f.atime,
            f.gzip,
            f.encryption,
            f.hmac,
        ));
    }

    let total_data_bytes = (archive.eof() - data_start) as u32;
    archive.rewrite_datablock_prelude(prelude_offset, total_data_bytes)?;

    for d in &dirs {
        let (flags, key_bytes) = if options.encryption {
            (FLAG_ENCRYPTION, crypto::encrypt(d.key.as_bytes(), archive.cipher_key()))
        } else {
            (0u8, d.key.as_bytes().to_vec())
        };
        let mut buf = Vec::new();
        write_directory_record(&mut buf, flags, d.mode, d.mtime, d.atime, &key_bytes)?;
        archive.append_bytes(&buf)?;
    }

    for (key, offset, size, mode, mtime, atime, gzip, encryption, hmac) in &recorded {
        let mut flags = 0u8;
        if *gzip {
            flags |= FLAG_GZIP;
        }
        if *encryption {
            flags |= FLAG_ENCRYPTION;
        }
        if *hmac {
            flags |= FLAG_HMAC;
        }
        let key_bytes = if *encryption {
            crypto::encrypt(key.as_bytes(), archive.cipher_key())
        } else {
            key.as_bytes().to_vec()
        };
        let mut buf = Vec::new();
        write_index_record(&mut buf, flags, *offset, *size, *mode, *mtime, *atime, &key_bytes)?;
        archive.append_bytes(&buf)?;
    }

    Ok(())
}

fn collect_entries(
    entries: Vec<AddEntry>,
    options: &AddOptions,
) -> Result<(Vec<QueuedFile>, Vec<QueuedDir>)> {
    let mut files = Vec::new();
    let mut dirs = Vec::new();

    let mut queue: VecDeque<(AddEntry, String, usize)> = entries
        .into_iter()
        .map(|e| (e, options.prefix.clone(), 0))
        .collect();

    while let Some((entry, prefix, depth)) = queue.pop_front() {
        let gzip = entry.gzip.unwrap_or(options.gzip);
        let encryption = entry.encryption.unwrap_or(options.encryption);
        let hmac = entry.hmac.unwrap_or(options.hmac);

        match entry.source {
            Source::Directory { key } => {
                let full_key = join_key(&prefix, &key);
                check_key_len(&full_key)?;
                dirs.push(QueuedDir {
                    key: full_key,
                    mode: 0o755,
                    mtime: now_millis(),
                    atime: now_millis(),
                });
            }
            Source::Memory { key, bytes } => {
                let full_key = join_key(&prefix, &key);
                check_key_len(&full_key)?;
                files.push(QueuedFile {
                    key: full_key,
                    bytes: FileBytes::InMemory(bytes),
                    mode: 0o644,
                    mtime: now_millis(),
                    atime: now_millis(),
                    gzip,
                    encryption,
                    hmac,
                });
            }
            Source::Path(path) => {
                let basename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                let full_key = join_key(&prefix, &basename);
                let meta = fs::symlink_metadata(&path)?;

                if meta.is_dir() {
                    check_key_len(&full_key)?;
                    let stat = fs::metadata(&path)?;
                    dirs.push(QueuedDir {
                        key: full_key.clone(),
                        mode: unix_mode(&stat),
                        mtime: modified_millis(&stat),
                        atime: accessed_millis(&stat),
                    });
                    if depth >= MAX_WALK_DEPTH {
                        warn!(path = %path.display(), "directory walk depth limit reached, not descending further");
                        continue;
                    }
                    for child in fs::read_dir(&path)? {
                        let child = child?;
                        queue.push_back((
                            AddEntry {
                                source: Source::Path(child.path()),
                                gzip: entry.gzip,
                                encryption: entry.encryption,
                                hmac: entry.hmac,
                            },
                            full_key.clone(),
                            depth + 1,
                        ));
                    }
                } else {
                    check_key_len(&full_key)?;
                    let stat = fs::metadata(&path)?;
                    files.push(QueuedFile {
                        key: full_key,
                        bytes: FileBytes::OnDisk(path),
                        mode: unix_mode(&stat),
                        mtime: modified_millis(&stat),
                        atime: accessed_millis(&stat),
                        gzip,
                        encryption,
                        hmac,
                    });
                }
            }
        }
    }

    Ok((files, dirs))
}

#[cfg(unix)]
fn unix_mode(meta: &fs::Metadata) -> u16 {
    use std::os::unix::fs::PermissionsExt;
    (meta.permissions().mode() & 0o7777) as u16
}

#[cfg(not(unix))]
fn unix_mode(_meta: &fs::Metadata) -> u16 {
    0o644
}

fn modified_millis(meta: &fs::Metadata) -> f64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as f64)
        .unwrap_or_else(now_millis)
}

fn accessed_millis(meta: &fs::Metadata) -> f64 {
    meta.accessed()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as f64)
        .unwrap_or_else(now_millis)
}

/// Run `plaintext` through `(gzip?) -> (cipher?) -> (hmac?)`, entirely
/// buffer-based since the whole entry is already resident in memory by
/// the time this runs.
fn encode_pipeline(
    plaintext: &[u8],
    gzip: bool,
    encryption: bool,
    hmac: bool,
    key: &CipherKey,
) -> Result<Vec<u8>> {
    let mut buf = if gzip {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(plaintext)?;
        enc.finish()?
    } else {
        plaintext.to_vec()
    };

    if encryption {
        buf = crypto::encrypt(&buf, key);
    }

    if hmac {
        let tag = crypto::hmac_sign(&buf, key);
        buf.extend_from_slice(&tag);
    }

    Ok(buf)
}
