//! Push-based transform stages recast as `Read`/`Write` adapters.
//!
//! The source format composes four stream stages — cipher, decipher,
//! append-hmac, de-hmac — left to right: `source → gzip? → cipher? →
//! hmac? → sink`. In Rust these become ordinary `std::io::Read`/`Write`
//! wrappers, the same shape `flate2`'s `GzEncoder`/`GzDecoder` already
//! use; gzip itself is just `flate2`, not reimplemented here.

mod cipher;
mod hmac;

pub use cipher::{CipherReader, CipherWriter};
pub use hmac::{DeHmacReader, HmacAppendWriter};
