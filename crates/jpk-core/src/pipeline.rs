//! Shared decode pipeline: `source window -> (dehmac?) -> (decipher?) ->
//! (gunzip?)`, used by both `ExtractSession` and the `get_buffer`/
//! `get_stream` reader API so the sequence runs exactly once per entry —
//! the source format's `getBuffer` infamously runs this twice back to
//! back, which this crate does not reproduce (see the design notes).

use std::io;

use flate2::read::GzDecoder;

use crate::crypto::{self, CipherKey};
use crate::error::{JpkError, Result};

#[allow(clippy::too_many_arguments)]
pub(crate) fn decode_entry(
    raw: Vec<u8>,
    has_hmac: bool,
    verify_hmac: bool,
    decrypt: bool,
    gunzip: bool,
    key: &CipherKey,
    entry_key: &str,
) -> Result<Vec<u8>> {
    let mut buf = raw;

    if has_hmac {
        if buf.len() < crypto::MAC_SIZE {
            return Err(JpkError::EntryHmacMismatch {
                key: entry_key.to_string(),
            });
        }
        let split = buf.len() - crypto::MAC_SIZE;
        if verify_hmac {
            let (body, tag) = buf.split_at(split);
            if !crypto::hmac_verify(body, tag, key) {
                return Err(JpkError::EntryHmacMismatch {
                    key: entry_key.to_string(),
                });
            }
        }
        buf.truncate(split);
    }

    if decrypt {
        buf = crypto::decrypt(&buf, key).ok_or(JpkError::TruncatedRecord)?;
    }

    if gunzip {
        let mut dec = GzDecoder::new(&buf[..]);
        let mut out = Vec::new();
        io::copy(&mut dec, &mut out)?;
        Ok(out)
    } else {
        Ok(buf)
    }
}
