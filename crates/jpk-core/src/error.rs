//! Error types for the JPK container format.
//!
//! Each variant corresponds to one fault named in the format's error
//! taxonomy. `Io` wraps the underlying filesystem/stream failure and is
//! propagated verbatim, as with any other `#[from]` conversion in this
//! crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JpkError {
    #[error("not a JPK file: bad magic bytes")]
    BadMagic,

    #[error("truncated record while parsing archive")]
    TruncatedRecord,

    #[error("unknown header key: {0}")]
    UnknownHeader(String),

    #[error("header value too large ({len} bytes, max {max})")]
    HeaderTooLarge { len: usize, max: usize },

    #[error("key too large: {key:?} is {len} bytes, max {max}")]
    KeyTooLarge { key: String, len: usize, max: usize },

    #[error("invalid prefix {prefix:?}: must be relative and contain no '..' or '~' segments")]
    InvalidPrefix { prefix: String },

    #[error("unsafe key {key:?}: would escape the extraction target directory")]
    UnsafeKey { key: String },

    #[error("meta HMAC verification requested but no metaHmac header is present")]
    HmacMissing,

    #[error("meta HMAC verification failed: archive headers/index/directory have been tampered with")]
    HmacMismatch,

    #[error("per-entry HMAC verification failed for {key:?}: tampering or wrong key")]
    EntryHmacMismatch { key: String },

    #[error("no entry named {key:?} in this archive")]
    EntryNotFound { key: String },

    #[error("archive has not been loaded; call load() before reading entries")]
    NotLoaded,

    #[error("a metaHmac header is already present; add_meta_hmac() is not idempotent")]
    MetaHmacAlreadyPresent,

    #[error("archive already exists at this path")]
    AlreadyExists,

    #[error("archive does not exist at this path")]
    DoesNotExist,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, JpkError>;
