//! Reader API: `get_buffer` and `get_stream`, the buffer- and
//! stream-flavored ways to pull a decoded entry back out of an archive.
//!
//! Both run the same `dehmac? -> decipher? -> gunzip?` pipeline as
//! `ExtractSession` (see [`crate::pipeline`]); `get_stream` just hands
//! the already-decoded bytes back as a `Read` instead of a `Vec<u8>`,
//! since a single entry never spans more than one in-memory window.

use std::io::Cursor;

use tracing::{instrument, warn};

use crate::archive::Archive;
use crate::error::{JpkError, Result};
use crate::pipeline::decode_entry;

impl Archive {
    /// Decode `key` fully into memory, applying per-entry HMAC
    /// verification, decryption, and gunzip as the entry's flags
    /// dictate.
    ///
    /// An entry that has ever failed HMAC verification is poisoned:
    /// every subsequent call for that key fails immediately without
    /// re-attempting the check.
    #[instrument(level = "debug", skip(self), fields(key))]
    pub fn get_buffer(&mut self, key: &str, verify_hmac: bool) -> Result<Vec<u8>> {
        if !self.loaded {
            return Err(JpkError::NotLoaded);
        }
        if self.poisoned.contains(key) {
            warn!(key, "read attempted on a poisoned entry");
            return Err(JpkError::EntryHmacMismatch {
                key: key.to_string(),
            });
        }

        let entry = self
            .index
            .get(key)
            .cloned()
            .ok_or_else(|| JpkError::EntryNotFound {
                key: key.to_string(),
            })?;

        let window = self.read_window(entry.offset, entry.size)?;
        let result = decode_entry(
            window.into_inner(),
            entry.hmac,
            entry.hmac && verify_hmac,
            entry.encryption,
            entry.gzip,
            &self.cipher_key,
            &entry.key,
        );

        if matches!(result, Err(JpkError::EntryHmacMismatch { .. })) {
            self.poisoned.insert(key.to_string());
        }
        result
    }

    /// `get_buffer`'s result wrapped in a `Read`, for callers that want
    /// to copy an entry's bytes into their own sink without collecting
    /// them first.
    pub fn get_stream(&mut self, key: &str, verify_hmac: bool) -> Result<Cursor<Vec<u8>>> {
        Ok(Cursor::new(self.get_buffer(key, verify_hmac)?))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use tempfile::NamedTempFile;

    use crate::archive::Archive;
    use crate::error::JpkError;
    use crate::write_session::{self, AddEntry, AddOptions};

    fn temp_path() -> std::path::PathBuf {
        let f = NamedTempFile::new().unwrap();
        let path = f.path().to_path_buf();
        drop(f);
        path
    }

    #[test]
    fn get_buffer_roundtrip() {
        let path = temp_path();
        {
            let mut archive = Archive::open(&path, true, b"").unwrap();
            write_session::add(
                &mut archive,
                vec![AddEntry::memory("hello.txt", b"hi".to_vec())],
                &AddOptions::default(),
            )
            .unwrap();
        }
        let mut archive = Archive::open(&path, false, b"").unwrap();
        archive.load(false).unwrap();
        assert_eq!(archive.get_buffer("hello.txt", true).unwrap(), b"hi");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn get_stream_roundtrip() {
        let path = temp_path();
        {
            let mut archive = Archive::open(&path, true, b"").unwrap();
            write_session::add(
                &mut archive,
                vec![AddEntry::memory("hello.txt", b"hi".to_vec())],
                &AddOptions::default(),
            )
            .unwrap();
        }
        let mut archive = Archive::open(&path, false, b"").unwrap();
        archive.load(false).unwrap();
        let mut stream = archive.get_stream("hello.txt", true).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hi");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_key_is_entry_not_found() {
        let path = temp_path();
        let mut archive = Archive::open(&path, true, b"").unwrap();
        archive.load(false).unwrap();
        let err = archive.get_buffer("nope.txt", true).unwrap_err();
        assert!(matches!(err, JpkError::EntryNotFound { .. }));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn tampered_hmac_entry_poisons_future_reads() {
        let path = temp_path();
        {
            let mut archive = Archive::open(&path, true, b"").unwrap();
            let opts = AddOptions {
                hmac: true,
                ..AddOptions::default()
            };
            write_session::add(
                &mut archive,
                vec![AddEntry::memory("data.bin", b"abcdefgh".to_vec())],
                &opts,
            )
            .unwrap();
        }

        // Locate the entry's data window and flip the last byte of its
        // trailing HMAC tag.
        {
            use std::io::{Read as _, Seek, SeekFrom, Write};
            let mut archive = Archive::open(&path, false, b"").unwrap();
            archive.load(false).unwrap();
            let entry = archive.get_meta("data.bin").unwrap().unwrap();
            let tamper_at = u64::from(entry.offset) + u64::from(entry.size) - 1;
            drop(archive);

            let mut file = std::fs::OpenOptions::new().read(true).write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(tamper_at)).unwrap();
            let mut byte = [0u8; 1];
            file.read_exact(&mut byte).unwrap();
            file.seek(SeekFrom::Start(tamper_at)).unwrap();
            file.write_all(&[byte[0] ^ 0xFF]).unwrap();
        }

        let mut archive = Archive::open(&path, false, b"").unwrap();
        archive.load(false).unwrap();
        assert!(archive.get_buffer("data.bin", true).is_err());
        // Second attempt fails immediately as a poisoned entry, not a
        // fresh (possibly different) verification outcome.
        let err = archive.get_buffer("data.bin", true).unwrap_err();
        assert!(matches!(err, JpkError::EntryHmacMismatch { .. }));
        std::fs::remove_file(&path).ok();
    }
}
