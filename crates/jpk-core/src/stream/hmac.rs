//! Streaming HMAC-SHA256 adapters.
//!
//! `HmacAppendWriter` passes bytes through unchanged while updating a
//! running HMAC, appending the 32-byte digest to the sink on `finish()`.
//! `DeHmacReader` is the inverse: it streams bytes through but withholds
//! a rolling 32-byte tail, since those bytes might be the trailing HMAC —
//! they're only released once more input proves they weren't the last
//! 32 bytes of the window. `finish()` splits off the final tail and,
//! when verification is requested, compares it against the computed
//! digest.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use ring::hmac;

use crate::crypto::{CipherKey, MAC_SIZE};

pub struct HmacAppendWriter<W> {
    inner: W,
    ctx: hmac::Context,
}

impl<W: Write> HmacAppendWriter<W> {
    pub fn new(inner: W, key: &CipherKey) -> Self {
        let hmac_key = hmac::Key::new(hmac::HMAC_SHA256, key.mac_key());
        Self {
            inner,
            ctx: hmac::Context::with_key(&hmac_key),
        }
    }

    /// Append the computed HMAC-SHA256 digest to the sink and return the
    /// inner writer.
    pub fn finish(self) -> io::Result<W> {
        let mut inner = self.inner;
        let tag = self.ctx.sign();
        inner.write_all(tag.as_ref())?;
        Ok(inner)
    }
}

impl<W: Write> Write for HmacAppendWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.ctx.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

pub struct DeHmacReader<R> {
    inner: R,
    ctx: hmac::Context,
    /// Bytes read from `inner` but not yet released to the caller,
    /// because they might be (part of) the trailing MAC.
    pending: VecDeque<u8>,
    inner_eof: bool,
    /// Set once `inner` has hit EOF and the tail has been split off.
    tail: Option<[u8; MAC_SIZE]>,
}

impl<R: Read> DeHmacReader<R> {
    pub fn new(inner: R, key: &CipherKey) -> Self {
        let hmac_key = hmac::Key::new(hmac::HMAC_SHA256, key.mac_key());
        Self {
            inner,
            ctx: hmac::Context::with_key(&hmac_key),
            pending: VecDeque::new(),
            inner_eof: false,
            tail: None,
        }
    }

    fn top_up(&mut self) -> io::Result<()> {
        if self.inner_eof {
            return Ok(());
        }
        let mut chunk = [0u8; 8192];
        let n = self.inner.read(&mut chunk)?;
        if n == 0 {
            self.inner_eof = true;
        } else {
            self.pending.extend(chunk[..n].iter().copied());
        }
        Ok(())
    }

    /// Split off the trailing 32 bytes once the inner stream is
    /// exhausted and we have no more than `MAC_SIZE` bytes pending.
    fn settle_tail(&mut self) {
        if self.tail.is_some() {
            return;
        }
        debug_assert!(self.inner_eof);
        let mut tail = [0u8; MAC_SIZE];
        let n = self.pending.len().min(MAC_SIZE);
        for (i, byte) in self.pending.drain(self.pending.len() - n..).enumerate() {
            tail[MAC_SIZE - n + i] = byte;
        }
        self.tail = Some(tail);
    }

    /// Finalize the stream: if `verify` is set, compare the withheld
    /// tail against the computed digest and fail on mismatch.
    pub fn finish(mut self, verify: bool) -> io::Result<()> {
        while !self.inner_eof {
            self.top_up()?;
        }
        self.settle_tail();
        if verify {
            let expected = self.tail.unwrap();
            let tag = self.ctx.sign();
            if tag.as_ref() != expected {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "HMAC verification failed",
                ));
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for DeHmacReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.pending.len() > MAC_SIZE {
                let releasable = self.pending.len() - MAC_SIZE;
                let n = releasable.min(buf.len());
                if n > 0 {
                    for slot in buf[..n].iter_mut() {
                        let byte = self.pending.pop_front().unwrap();
                        self.ctx.update(&[byte]);
                        *slot = byte;
                    }
                    return Ok(n);
                }
            }
            if self.inner_eof {
                return Ok(0);
            }
            self.top_up()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;

    #[test]
    fn roundtrip_verify_ok() {
        let key = CipherKey::derive(b"secret");
        let mut tagged = Vec::new();
        {
            let mut w = HmacAppendWriter::new(&mut tagged, &key);
            w.write_all(b"hello world").unwrap();
            w.finish().unwrap();
        }

        let mut r = DeHmacReader::new(&tagged[..], &key);
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello world");
        r.finish(true).unwrap();
    }

    #[test]
    fn tamper_detected_on_verify() {
        let key = CipherKey::derive(b"secret");
        let mut tagged = Vec::new();
        {
            let mut w = HmacAppendWriter::new(&mut tagged, &key);
            w.write_all(b"hello world").unwrap();
            w.finish().unwrap();
        }
        let last = tagged.len() - 1;
        tagged[last] ^= 0xFF;

        let mut r = DeHmacReader::new(&tagged[..], &key);
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert!(r.finish(true).is_err());
    }

    #[test]
    fn discard_without_verify() {
        let key = CipherKey::derive(b"secret");
        let mut tagged = Vec::new();
        {
            let mut w = HmacAppendWriter::new(&mut tagged, &key);
            w.write_all(b"data").unwrap();
            w.finish().unwrap();
        }
        let mut r = DeHmacReader::new(&tagged[..], &key);
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"data");
        r.finish(false).unwrap();
    }
}
