//! On-disk record layouts: Header, Index, Directory, Datablock.
//!
//! All multi-byte integers are big-endian. Every record starts with a
//! 1-byte flags field whose low two bits select the record type and
//! whose high bits are independent attribute flags (gzip, encryption,
//! hmac, deleted).

use std::io::{self, Read, Write};

use crate::byte_codec::*;

pub const VALUE_BUFFER_MAX_SIZE: usize = 65_536;
pub const KEY_BUFFER_MAX_SIZE: usize = 65_536;
/// Effective maximum plaintext key length, leaving room for the IV (and
/// future HMAC headroom) when the key is stored encrypted.
pub const KEY_MAX_SIZE: usize = KEY_BUFFER_MAX_SIZE - 1024;

pub const MASK_TYPE: u8 = 0b0000_0011;
pub const FLAG_DELETED: u8 = 0b0000_0100;
pub const FLAG_GZIP: u8 = 0b0000_1000;
pub const FLAG_ENCRYPTION: u8 = 0b0010_0000;
pub const FLAG_HMAC: u8 = 0b1000_0000;

pub const TYPE_HEADER: u8 = 0;
pub const TYPE_INDEX: u8 = 1;
pub const TYPE_DATABLOCK: u8 = 2;
pub const TYPE_DIRECTORY: u8 = 3;

pub fn record_type(flags: u8) -> u8 {
    flags & MASK_TYPE
}

/// Parsed Header record: raw key/value bytes plus the flags byte (always
/// 0 per the wire format, but kept for symmetry with the other records).
pub struct HeaderRecord {
    pub key: String,
    pub value: Vec<u8>,
}

pub fn write_header_record<W: Write>(w: &mut W, key: &str, value: &[u8]) -> io::Result<()> {
    write_u8(w, TYPE_HEADER)?;
    write_lp_bytes_u8(w, key.as_bytes())?;
    write_lp_bytes_u16(w, value)?;
    Ok(())
}

/// Read a Header record. `flags` has already been consumed by the
/// caller (see `BlockCodec::peek_flags`).
pub fn read_header_record<R: Read>(r: &mut R) -> io::Result<HeaderRecord> {
    let key_bytes = read_lp_bytes_u8(r)?;
    let key = String::from_utf8(key_bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let value = read_lp_bytes_u16(r)?;
    Ok(HeaderRecord { key, value })
}

pub struct IndexRecord {
    pub flags: u8,
    pub offset: u32,
    pub size: u32,
    pub mode: u16,
    pub mtime: f64,
    pub atime: f64,
    pub key: Vec<u8>,
}

#[allow(clippy::too_many_arguments)]
pub fn write_index_record<W: Write>(
    w: &mut W,
    flags: u8,
    offset: u32,
    size: u32,
    mode: u16,
    mtime: f64,
    atime: f64,
    key: &[u8],
) -> io::Result<()> {
    write_u8(w, TYPE_INDEX | flags)?;
    write_u32(w, offset)?;
    write_u32(w, size)?;
    write_u16(w, mode)?;
    write_f64(w, mtime)?;
    write_f64(w, atime)?;
    write_u16(w, key.len() as u16)?;
    w.write_all(key)
}

pub fn read_index_record<R: Read>(r: &mut R, flags: u8) -> io::Result<IndexRecord> {
    let offset = read_u32(r)?;
    let size = read_u32(r)?;
    let mode = read_u16(r)?;
    let mtime = read_f64(r)?;
    let atime = read_f64(r)?;
    let key_len = read_u16(r)? as usize;
    let mut key = vec![0u8; key_len];
    r.read_exact(&mut key)?;
    Ok(IndexRecord {
        flags,
        offset,
        size,
        mode,
        mtime,
        atime,
        key,
    })
}

pub struct DirectoryRecord {
    pub flags: u8,
    pub mode: u16,
    pub mtime: f64,
    pub atime: f64,
    pub key: Vec<u8>,
}

pub fn write_directory_record<W: Write>(
    w: &mut W,
    flags: u8,
    mode: u16,
    mtime: f64,
    atime: f64,
    key: &[u8],
) -> io::Result<()> {
    write_u8(w, TYPE_DIRECTORY | flags)?;
    write_u16(w, mode)?;
    write_f64(w, mtime)?;
    write_f64(w, atime)?;
    // Authoritative width is 2 bytes: the format note in the source
    // comments mentions a 1-byte length, but code reads/writes 2.
    write_u16(w, key.len() as u16)?;
    w.write_all(key)
}

pub fn read_directory_record<R: Read>(r: &mut R, flags: u8) -> io::Result<DirectoryRecord> {
    let mode = read_u16(r)?;
    let mtime = read_f64(r)?;
    let atime = read_f64(r)?;
    let key_len = read_u16(r)? as usize;
    let mut key = vec![0u8; key_len];
    r.read_exact(&mut key)?;
    Ok(DirectoryRecord {
        flags,
        mode,
        mtime,
        atime,
        key,
    })
}

/// Write a Datablock prelude (flags + 4-byte size). The caller streams
/// `size` bytes of content immediately afterward.
pub fn write_datablock_prelude<W: Write>(w: &mut W, flags: u8, size: u32) -> io::Result<()> {
    write_u8(w, TYPE_DATABLOCK | flags)?;
    write_u32(w, size)
}

pub fn read_datablock_prelude<R: Read>(r: &mut R, flags: u8) -> io::Result<u32> {
    let _ = flags;
    read_u32(r)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_record_roundtrip() {
        let mut buf = Vec::new();
        write_header_record(&mut buf, "majorVersion", &[1]).unwrap();
        let mut cursor = &buf[1..]; // skip flags byte, caller reads it separately
        let rec = read_header_record(&mut cursor).unwrap();
        assert_eq!(rec.key, "majorVersion");
        assert_eq!(rec.value, vec![1]);
    }

    #[test]
    fn index_record_fixed_size_is_29_bytes_plus_key() {
        let mut buf = Vec::new();
        write_index_record(&mut buf, 0, 10, 20, 0o644, 1.0, 2.0, b"hello.txt").unwrap();
        assert_eq!(buf.len(), 29 + 9);
    }

    #[test]
    fn directory_record_fixed_size_is_21_bytes_plus_key() {
        let mut buf = Vec::new();
        write_directory_record(&mut buf, 0, 0o755, 1.0, 2.0, b"dir").unwrap();
        assert_eq!(buf.len(), 21 + 3);
    }

    #[test]
    fn datablock_prelude_is_5_bytes() {
        let mut buf = Vec::new();
        write_datablock_prelude(&mut buf, 0, 42).unwrap();
        assert_eq!(buf.len(), 5);
    }
}
