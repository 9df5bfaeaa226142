//! Archive: open/load/parse of a JPK file, header/index/directory
//! tables, and the meta-HMAC compute/verify machinery.

use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use ring::hmac;
use tracing::{debug, instrument, trace, warn};

use crate::block::*;
use crate::byte_codec::*;
use crate::crypto::{self, CipherKey, MAC_SIZE};
use crate::error::{JpkError, Result};
use crate::ordered_map::OrderedMap;

pub const MAGIC: &[u8; 3] = b"JPK";

/// A short read in the middle of a record means the file ends with a
/// partial write (§5/§7: "partial writes may leave a trailing incomplete
/// record"). Map that case to `TruncatedRecord` instead of letting the
/// raw `UnexpectedEof` surface as an opaque `Io` error.
fn classify_parse_io(e: io::Error) -> JpkError {
    if e.kind() == ErrorKind::UnexpectedEof {
        JpkError::TruncatedRecord
    } else {
        JpkError::Io(e)
    }
}

/// Header keys this crate understands; any other key round-trips as raw
/// bytes (`HeaderValue::Raw`).
const OUT_OF_HMAC: &[&str] = &["metaHmac"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    U8(u8),
    Hmac([u8; MAC_SIZE]),
    Raw(Vec<u8>),
}

impl HeaderValue {
    fn encode(&self) -> Vec<u8> {
        match self {
            HeaderValue::U8(v) => vec![*v],
            HeaderValue::Hmac(bytes) => bytes.to_vec(),
            HeaderValue::Raw(bytes) => bytes.clone(),
        }
    }

    fn decode(key: &str, bytes: Vec<u8>) -> Self {
        match key {
            "majorVersion" | "minorVersion" => {
                HeaderValue::U8(bytes.first().copied().unwrap_or(0))
            }
            "metaHmac" => {
                let mut tag = [0u8; MAC_SIZE];
                let n = bytes.len().min(MAC_SIZE);
                tag[..n].copy_from_slice(&bytes[..n]);
                HeaderValue::Hmac(tag)
            }
            _ => HeaderValue::Raw(bytes),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub key: String,
    pub offset: u32,
    pub size: u32,
    pub mode: u16,
    pub mtime: f64,
    pub atime: f64,
    pub gzip: bool,
    pub encryption: bool,
    pub hmac: bool,
    pub deleted: bool,
}

#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub key: String,
    pub mode: u16,
    pub mtime: f64,
    pub atime: f64,
    pub encryption: bool,
}

/// A JPK archive, opened against a single backing file.
///
/// Not internally synchronized: callers must serialize mutating calls
/// (`add`, `add_header`, `add_meta_hmac`) themselves. See the crate's
/// concurrency notes.
pub struct Archive {
    pub(crate) path: PathBuf,
    pub(crate) file: File,
    pub(crate) eof: u64,
    pub(crate) is_new: bool,
    pub(crate) loaded: bool,
    pub(crate) cipher_key: CipherKey,
    pub(crate) headers: OrderedMap<HeaderValue>,
    pub(crate) index: OrderedMap<IndexEntry>,
    pub(crate) directory: OrderedMap<DirectoryEntry>,
    pub(crate) meta_hmac: Option<[u8; MAC_SIZE]>,
    /// Keys whose per-entry HMAC has already failed verification once.
    /// Per the format's error handling policy, a poisoned entry fails
    /// every subsequent read immediately rather than re-attempting the
    /// verification.
    pub(crate) poisoned: std::collections::HashSet<String>,
}

impl Archive {
    /// Open (or create) the archive at `path`.
    ///
    /// `should_be_new` demands the opposite of what's on disk when
    /// false: an existing file is required. When true, the file must
    /// not already exist.
    #[instrument(level = "debug", skip(user_key), fields(path = %path.display()))]
    pub fn open(path: &Path, should_be_new: bool, user_key: &[u8]) -> Result<Self> {
        let cipher_key = CipherKey::derive(user_key);

        if path.exists() {
            if should_be_new {
                return Err(JpkError::AlreadyExists);
            }
            let mut file = OpenOptions::new().read(true).write(true).open(path)?;
            let mut magic = [0u8; 3];
            file.read_exact(&mut magic)?;
            if &magic != MAGIC {
                return Err(JpkError::BadMagic);
            }
            let eof = file.metadata()?.len();
            debug!(eof, "opened existing archive");
            Ok(Self {
                path: path.to_path_buf(),
                file,
                eof,
                is_new: false,
                loaded: false,
                cipher_key,
                headers: OrderedMap::new(),
                index: OrderedMap::new(),
                directory: OrderedMap::new(),
                meta_hmac: None,
                poisoned: std::collections::HashSet::new(),
            })
        } else {
            if !should_be_new {
                return Err(JpkError::DoesNotExist);
            }
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            file.write_all(MAGIC)?;
            file.flush()?;
            debug!("created new archive");
            Ok(Self {
                path: path.to_path_buf(),
                file,
                eof: 3,
                is_new: true,
                loaded: true,
                cipher_key,
                headers: OrderedMap::new(),
                index: OrderedMap::new(),
                directory: OrderedMap::new(),
                meta_hmac: None,
                poisoned: std::collections::HashSet::new(),
            })
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn eof(&self) -> u64 {
        self.eof
    }

    pub fn cipher_key(&self) -> &CipherKey {
        &self.cipher_key
    }

    /// Walk every record from offset 3 to EOF.
    ///
    /// When `load_meta` is set, headers/index/directory maps are
    /// populated. When `compute_hmac` is set, a running HMAC-SHA256 is
    /// accumulated over every record's fixed + key bytes (value bytes
    /// too, for headers), excluding the `metaHmac` header and excluding
    /// datablock bodies, and stashed in `self.meta_hmac` on completion.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub(crate) fn parse_meta(&mut self, load_meta: bool, compute_hmac: bool) -> Result<()> {
        let hmac_key = hmac::Key::new(hmac::HMAC_SHA256, self.cipher_key.mac_key());
        let mut ctx = hmac::Context::with_key(&hmac_key);

        self.file.seek(SeekFrom::Start(3))?;
        let eof = self.eof;
        let mut pos: u64 = 3;

        if load_meta {
            self.headers = OrderedMap::new();
            self.index = OrderedMap::new();
            self.directory = OrderedMap::new();
        }

        while pos < eof {
            let flags = read_u8(&mut self.file).map_err(classify_parse_io)?;
            pos += 1;
            match record_type(flags) {
                TYPE_HEADER => {
                    let mut fixed_and_key = Vec::new();
                    fixed_and_key.push(flags);
                    let key_bytes = read_lp_bytes_u8(&mut self.file).map_err(classify_parse_io)?;
                    fixed_and_key.push(key_bytes.len() as u8);
                    fixed_and_key.extend_from_slice(&key_bytes);
                    let value = read_lp_bytes_u16(&mut self.file).map_err(classify_parse_io)?;
                    let mut value_len_and_value = Vec::with_capacity(2 + value.len());
                    value_len_and_value.extend_from_slice(&(value.len() as u16).to_be_bytes());
                    value_len_and_value.extend_from_slice(&value);

                    let key = String::from_utf8(key_bytes.clone())
                        .map_err(|_| JpkError::TruncatedRecord)?;
                    pos += 1 + key_bytes.len() as u64 + 2 + value.len() as u64;

                    if compute_hmac && !OUT_OF_HMAC.contains(&key.as_str()) {
                        ctx.update(&fixed_and_key);
                        ctx.update(&value_len_and_value);
                    }
                    if load_meta {
                        let decoded = HeaderValue::decode(&key, value);
                        trace!(key = %key, "parsed header record");
                        self.headers.insert(key, decoded);
                    }
                }
                TYPE_INDEX => {
                    let rec = read_index_record(&mut self.file, flags).map_err(classify_parse_io)?;
                    pos += 28 + rec.key.len() as u64;
                    if compute_hmac {
                        ctx.update(&record_fixed_bytes_index(&rec));
                        ctx.update(&rec.key);
                    }
                    if load_meta {
                        let plaintext_key = if flags & FLAG_ENCRYPTION != 0 {
                            crypto::decrypt(&rec.key, &self.cipher_key)
                                .ok_or(JpkError::TruncatedRecord)?
                        } else {
                            rec.key.clone()
                        };
                        let key = String::from_utf8(plaintext_key)
                            .map_err(|_| JpkError::TruncatedRecord)?;
                        trace!(key = %key, "parsed index record");
                        if flags & FLAG_DELETED == 0 {
                            self.index.insert(
                                key.clone(),
                                IndexEntry {
                                    key,
                                    offset: rec.offset,
                                    size: rec.size,
                                    mode: rec.mode,
                                    mtime: rec.mtime,
                                    atime: rec.atime,
                                    gzip: flags & FLAG_GZIP != 0,
                                    encryption: flags & FLAG_ENCRYPTION != 0,
                                    hmac: flags & FLAG_HMAC != 0,
                                    deleted: false,
                                },
                            );
                        }
                    }
                }
                TYPE_DIRECTORY => {
                    let rec = read_directory_record(&mut self.file, flags).map_err(classify_parse_io)?;
                    pos += 20 + rec.key.len() as u64;
                    if compute_hmac {
                        ctx.update(&record_fixed_bytes_directory(&rec));
                        ctx.update(&rec.key);
                    }
                    if load_meta {
                        let plaintext_key = if flags & FLAG_ENCRYPTION != 0 {
                            crypto::decrypt(&rec.key, &self.cipher_key)
                                .ok_or(JpkError::TruncatedRecord)?
                        } else {
                            rec.key.clone()
                        };
                        let key = String::from_utf8(plaintext_key)
                            .map_err(|_| JpkError::TruncatedRecord)?;
                        trace!(key = %key, "parsed directory record");
                        if flags & FLAG_DELETED == 0 {
                            self.directory.insert(
                                key.clone(),
                                DirectoryEntry {
                                    key,
                                    mode: rec.mode,
                                    mtime: rec.mtime,
                                    atime: rec.atime,
                                    encryption: flags & FLAG_ENCRYPTION != 0,
                                },
                            );
                        }
                    }
                }
                TYPE_DATABLOCK => {
                    let size = read_datablock_prelude(&mut self.file, flags).map_err(classify_parse_io)?;
                    if compute_hmac {
                        let mut prelude = Vec::with_capacity(5);
                        prelude.push(flags);
                        prelude.extend_from_slice(&size.to_be_bytes());
                        ctx.update(&prelude);
                    }
                    pos += 4 + u64::from(size);
                    self.file.seek(SeekFrom::Current(i64::from(size)))?;
                }
                _ => return Err(JpkError::TruncatedRecord),
            }
        }

        if pos != eof {
            warn!(pos, eof, "archive ended mid-record");
            return Err(JpkError::TruncatedRecord);
        }

        if load_meta {
            self.loaded = true;
        }
        if compute_hmac {
            let tag = ctx.sign();
            let mut digest = [0u8; MAC_SIZE];
            digest.copy_from_slice(tag.as_ref());
            self.meta_hmac = Some(digest);
        }
        Ok(())
    }

    /// Load the full index/directory/header state. When
    /// `should_verify_meta_hmac` is set, the computed meta HMAC is
    /// compared against the stored `metaHmac` header.
    #[instrument(level = "info", skip(self), fields(path = %self.path.display()))]
    pub fn load(&mut self, should_verify_meta_hmac: bool) -> Result<()> {
        self.parse_meta(true, should_verify_meta_hmac)?;
        if should_verify_meta_hmac {
            let stored = match self.headers.get("metaHmac") {
                Some(HeaderValue::Hmac(tag)) => *tag,
                _ => return Err(JpkError::HmacMissing),
            };
            let computed = self.meta_hmac.expect("compute_hmac was requested");
            if computed != stored {
                warn!("meta HMAC mismatch on load");
                return Err(JpkError::HmacMismatch);
            }
        }
        Ok(())
    }

    /// Recompute the meta HMAC by re-walking every record currently in
    /// the file, without touching the in-memory tables.
    pub(crate) fn compute_meta_hmac(&mut self) -> Result<[u8; MAC_SIZE]> {
        self.parse_meta(false, true)?;
        Ok(self.meta_hmac.expect("compute_hmac was requested"))
    }

    /// Idempotent: writes `majorVersion`/`minorVersion` headers once per
    /// new archive.
    pub(crate) fn add_core_headers(&mut self) -> Result<()> {
        if !self.is_new || self.headers.contains_key("majorVersion") {
            return Ok(());
        }
        self.add_header_raw("majorVersion", &HeaderValue::U8(1))?;
        self.add_header_raw("minorVersion", &HeaderValue::U8(0))?;
        Ok(())
    }

    /// Append a Header record at EOF and update the in-memory table.
    /// `key` must be one of the recognized header keys.
    pub fn add_header(&mut self, key: &str, value: HeaderValue) -> Result<()> {
        if !matches!(key, "majorVersion" | "minorVersion" | "metaHmac") {
            return Err(JpkError::UnknownHeader(key.to_string()));
        }
        if self.is_new && !self.headers.contains_key("majorVersion") && key != "majorVersion" {
            self.add_core_headers()?;
        }
        self.add_header_raw(key, &value)
    }

    fn add_header_raw(&mut self, key: &str, value: &HeaderValue) -> Result<()> {
        let encoded = value.encode();
        if encoded.len() > VALUE_BUFFER_MAX_SIZE {
            return Err(JpkError::HeaderTooLarge {
                len: encoded.len(),
                max: VALUE_BUFFER_MAX_SIZE,
            });
        }
        self.file.seek(SeekFrom::Start(self.eof))?;
        write_header_record(&mut self.file, key, &encoded)?;
        self.eof += 4 + key.len() as u64 + encoded.len() as u64;
        self.headers.insert(key.to_string(), value.clone());
        Ok(())
    }

    /// Compute (if necessary) and store the meta HMAC. Fails if a
    /// `metaHmac` header is already present — this call is not
    /// idempotent.
    #[instrument(level = "info", skip(self))]
    pub fn add_meta_hmac(&mut self) -> Result<[u8; MAC_SIZE]> {
        if self.headers.contains_key("metaHmac") {
            return Err(JpkError::MetaHmacAlreadyPresent);
        }
        let digest = self.compute_meta_hmac()?;
        self.add_header("metaHmac", HeaderValue::Hmac(digest))?;
        Ok(digest)
    }

    // ---- Reader API ----

    pub fn has(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.index.keys().map(str::to_string).collect()
    }

    pub fn directory_keys(&self) -> Vec<String> {
        self.directory.keys().map(str::to_string).collect()
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<&IndexEntry>> {
        if !self.loaded {
            return Err(JpkError::NotLoaded);
        }
        Ok(self.index.get(key))
    }

    pub fn header(&self, key: &str) -> Option<&HeaderValue> {
        self.headers.get(key)
    }

    pub fn headers_iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.headers.iter()
    }

    pub fn index_entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.index.values()
    }

    pub fn directory_entries(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.directory.values()
    }

    /// Read the raw, still-encoded bytes of an entry's data window.
    pub(crate) fn read_window(&mut self, offset: u32, size: u32) -> Result<Cursor<Vec<u8>>> {
        self.file.seek(SeekFrom::Start(u64::from(offset)))?;
        let mut buf = vec![0u8; size as usize];
        self.file.read_exact(&mut buf)?;
        Ok(Cursor::new(buf))
    }

    pub(crate) fn seek_to_eof(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(self.eof))?;
        Ok(())
    }

    pub(crate) fn append_bytes(&mut self, bytes: &[u8]) -> Result<u64> {
        self.seek_to_eof()?;
        let offset = self.eof;
        self.file.write_all(bytes)?;
        self.eof += bytes.len() as u64;
        Ok(offset)
    }

    pub(crate) fn rewrite_datablock_prelude(&mut self, offset: u64, size: u32) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        write_datablock_prelude(&mut self.file, 0, size)?;
        Ok(())
    }
}

fn record_fixed_bytes_index(rec: &IndexRecord) -> Vec<u8> {
    let mut buf = Vec::with_capacity(29);
    buf.push(rec.flags);
    buf.extend_from_slice(&rec.offset.to_be_bytes());
    buf.extend_from_slice(&rec.size.to_be_bytes());
    buf.extend_from_slice(&rec.mode.to_be_bytes());
    buf.extend_from_slice(&rec.mtime.to_be_bytes());
    buf.extend_from_slice(&rec.atime.to_be_bytes());
    buf.extend_from_slice(&(rec.key.len() as u16).to_be_bytes());
    buf
}

fn record_fixed_bytes_directory(rec: &DirectoryRecord) -> Vec<u8> {
    let mut buf = Vec::with_capacity(21);
    buf.push(rec.flags);
    buf.extend_from_slice(&rec.mode.to_be_bytes());
    buf.extend_from_slice(&rec.mtime.to_be_bytes());
    buf.extend_from_slice(&rec.atime.to_be_bytes());
    buf.extend_from_slice(&(rec.key.len() as u16).to_be_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn temp_path() -> PathBuf {
        let f = NamedTempFile::new().unwrap();
        let path = f.path().to_path_buf();
        drop(f);
        path
    }

    #[test]
    fn create_new_archive_is_three_magic_bytes() {
        let path = temp_path();
        {
            let _archive = Archive::open(&path, true, b"").unwrap();
        }
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes, b"JPK");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn open_missing_existing_fails() {
        let path = temp_path();
        std::fs::remove_file(&path).ok();
        let err = Archive::open(&path, false, b"").unwrap_err();
        assert!(matches!(err, JpkError::DoesNotExist));
    }

    #[test]
    fn reopen_demanding_new_fails() {
        let path = temp_path();
        {
            let _archive = Archive::open(&path, true, b"").unwrap();
        }
        let err = Archive::open(&path, true, b"").unwrap_err();
        assert!(matches!(err, JpkError::AlreadyExists));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn truncated_trailing_record_is_truncated_record_not_io() {
        use crate::write_session::{self, AddEntry, AddOptions};

        let path = temp_path();
        {
            let mut archive = Archive::open(&path, true, b"").unwrap();
            write_session::add(
                &mut archive,
                vec![AddEntry::memory("data.bin", b"hello world".to_vec())],
                &AddOptions::default(),
            )
            .unwrap();
        }

        // Simulate an interrupted write: chop the last few bytes off the
        // trailing Index record's key, so the parser hits physical EOF
        // partway through a record instead of cleanly at a record boundary.
        let mut bytes = std::fs::read(&path).unwrap();
        let new_len = bytes.len() - 3;
        bytes.truncate(new_len);
        std::fs::write(&path, &bytes).unwrap();

        let mut archive = Archive::open(&path, false, b"").unwrap();
        let err = archive.load(false).unwrap_err();
        assert!(matches!(err, JpkError::TruncatedRecord));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn load_empty_archive_has_no_keys() {
        let path = temp_path();
        {
            let mut archive = Archive::open(&path, true, b"").unwrap();
            archive.load(false).unwrap();
            assert!(archive.keys().is_empty());
        }
        std::fs::remove_file(&path).ok();
    }
}
