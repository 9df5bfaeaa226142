//! Fixed-width big-endian integer, double, and length-prefixed string
//! primitives shared by every on-disk record.
//!
//! Byte order is a format constant: everything here is big-endian and
//! there is no negotiation.

use std::io::{self, Read, Write};

pub fn write_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

pub fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub fn write_u16<W: Write>(w: &mut W, v: u16) -> io::Result<()> {
    w.write_all(&v.to_be_bytes())
}

pub fn read_u16<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

pub fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_be_bytes())
}

pub fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

/// IEEE-754 64-bit big-endian double, used for millisecond timestamps.
pub fn write_f64<W: Write>(w: &mut W, v: f64) -> io::Result<()> {
    w.write_all(&v.to_be_bytes())
}

pub fn read_f64<R: Read>(r: &mut R) -> io::Result<f64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_be_bytes(buf))
}

/// Length-prefixed UTF-8 string with a 2-byte big-endian length.
pub fn write_lp_string_u16<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    let bytes = s.as_bytes();
    write_u16(w, bytes.len() as u16)?;
    w.write_all(bytes)
}

pub fn read_lp_string_u16<R: Read>(r: &mut R) -> io::Result<String> {
    let len = read_u16(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Length-prefixed raw bytes with a 1-byte length, used for header keys.
pub fn write_lp_bytes_u8<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    write_u8(w, bytes.len() as u8)?;
    w.write_all(bytes)
}

pub fn read_lp_bytes_u8<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let len = read_u8(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Length-prefixed raw bytes with a 2-byte length, used for header values
/// and encrypted index/directory keys.
pub fn write_lp_bytes_u16<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    write_u16(w, bytes.len() as u16)?;
    w.write_all(bytes)
}

pub fn read_lp_bytes_u16<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let len = read_u16(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u16_roundtrip() {
        let mut buf = Vec::new();
        write_u16(&mut buf, 0xBEEF).unwrap();
        assert_eq!(buf, [0xBE, 0xEF]);
        assert_eq!(read_u16(&mut &buf[..]).unwrap(), 0xBEEF);
    }

    #[test]
    fn u32_roundtrip() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 0xDEAD_BEEF).unwrap();
        assert_eq!(read_u32(&mut &buf[..]).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn f64_roundtrip() {
        let mut buf = Vec::new();
        write_f64(&mut buf, 1_700_000_000_123.0).unwrap();
        assert_eq!(buf.len(), 8);
        assert_eq!(read_f64(&mut &buf[..]).unwrap(), 1_700_000_000_123.0);
    }

    #[test]
    fn lp_string_roundtrip() {
        let mut buf = Vec::new();
        write_lp_string_u16(&mut buf, "hello.txt").unwrap();
        assert_eq!(buf.len(), 2 + 9);
        assert_eq!(read_lp_string_u16(&mut &buf[..]).unwrap(), "hello.txt");
    }
}
