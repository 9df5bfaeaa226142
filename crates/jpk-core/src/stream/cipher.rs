//! Streaming AES-256-CTR adapters.
//!
//! `CipherWriter` prepends a freshly generated IV to its first output and
//! then emits CTR-encrypted chunks as they're written. `CipherReader`
//! buffers the leading 16 bytes of input as the IV — tolerating delivery
//! split across multiple `read()` calls — before decrypting everything
//! after it. If fewer than 16 bytes ever arrive, `CipherReader` yields
//! nothing and completes silently, per the format's streaming contract.

use std::io::{self, Read, Write};

use aes::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;

use crate::crypto::{CipherKey, IV_SIZE};

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

pub struct CipherWriter<W> {
    inner: W,
    key: CipherKey,
    cipher: Option<Aes256Ctr>,
}

impl<W: Write> CipherWriter<W> {
    pub fn new(inner: W, key: CipherKey) -> Self {
        Self {
            inner,
            key,
            cipher: None,
        }
    }

    fn ensure_cipher(&mut self) -> io::Result<()> {
        if self.cipher.is_some() {
            return Ok(());
        }
        let mut iv = [0u8; IV_SIZE];
        rand::rng().fill_bytes(&mut iv);
        self.inner.write_all(&iv)?;
        self.cipher = Some(Aes256Ctr::new(self.key.aes_key().into(), (&iv).into()));
        Ok(())
    }

    /// Consume the writer, returning the inner sink. No trailing bytes
    /// are produced by this stage; CTR mode has no block padding.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CipherWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ensure_cipher()?;
        let mut chunk = buf.to_vec();
        self.cipher.as_mut().unwrap().apply_keystream(&mut chunk);
        self.inner.write_all(&chunk)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

pub struct CipherReader<R> {
    inner: R,
    key: CipherKey,
    cipher: Option<Aes256Ctr>,
    iv_buf: Vec<u8>,
    inner_eof: bool,
}

impl<R: Read> CipherReader<R> {
    pub fn new(inner: R, key: CipherKey) -> Self {
        Self {
            inner,
            key,
            cipher: None,
            iv_buf: Vec::with_capacity(IV_SIZE),
            inner_eof: false,
        }
    }

    fn fill_iv(&mut self) -> io::Result<()> {
        while self.iv_buf.len() < IV_SIZE && !self.inner_eof {
            let mut tmp = [0u8; IV_SIZE];
            let want = IV_SIZE - self.iv_buf.len();
            let n = self.inner.read(&mut tmp[..want])?;
            if n == 0 {
                self.inner_eof = true;
                break;
            }
            self.iv_buf.extend_from_slice(&tmp[..n]);
        }
        if self.iv_buf.len() == IV_SIZE && self.cipher.is_none() {
            let iv: [u8; IV_SIZE] = self.iv_buf[..].try_into().unwrap();
            self.cipher = Some(Aes256Ctr::new(self.key.aes_key().into(), (&iv).into()));
        }
        Ok(())
    }
}

impl<R: Read> Read for CipherReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cipher.is_none() {
            self.fill_iv()?;
            if self.cipher.is_none() {
                // Fewer than IV_SIZE bytes ever arrived: silent empty stream.
                return Ok(0);
            }
        }
        let n = self.inner.read(buf)?;
        self.cipher.as_mut().unwrap().apply_keystream(&mut buf[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;

    #[test]
    fn roundtrip_single_shot() {
        let key = CipherKey::derive(b"secret");
        let mut encrypted = Vec::new();
        {
            let mut w = CipherWriter::new(&mut encrypted, CipherKey::derive(b"secret"));
            w.write_all(b"abcdefgh").unwrap();
        }
        assert_eq!(encrypted.len(), IV_SIZE + 8);

        let mut r = CipherReader::new(&encrypted[..], key);
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abcdefgh");
    }

    #[test]
    fn roundtrip_many_small_writes() {
        let key = CipherKey::derive(b"secret");
        let mut encrypted = Vec::new();
        {
            let mut w = CipherWriter::new(&mut encrypted, CipherKey::derive(b"secret"));
            for byte in b"abcdefgh" {
                w.write_all(&[*byte]).unwrap();
            }
        }
        let mut r = CipherReader::new(&encrypted[..], key);
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abcdefgh");
    }

    #[test]
    fn short_input_yields_nothing() {
        let key = CipherKey::derive(b"secret");
        let mut r = CipherReader::new(&[1u8, 2, 3][..], key);
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
    }
}
