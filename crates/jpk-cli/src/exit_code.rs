//! Process exit codes, chosen by [`categorize_error`] from the error
//! chain rather than by matching message text.

pub const SUCCESS: u8 = 0;
pub const GENERAL_ERROR: u8 = 1;
pub const NOT_FOUND: u8 = 2;
pub const ALREADY_EXISTS: u8 = 3;
pub const INTEGRITY_FAILED: u8 = 4;
pub const BAD_INPUT: u8 = 5;
pub const NOT_LOADED: u8 = 6;

use jpk_core::JpkError;

/// Walk the error chain for a typed [`JpkError`] and map it onto a
/// process exit code. Falls back to [`GENERAL_ERROR`] when nothing in
/// the chain is a `JpkError` (e.g. a bare `anyhow::anyhow!` message).
pub fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(err) = cause.downcast_ref::<JpkError>() {
            return match err {
                JpkError::DoesNotExist => NOT_FOUND,
                JpkError::AlreadyExists => ALREADY_EXISTS,
                JpkError::BadMagic
                | JpkError::TruncatedRecord
                | JpkError::HmacMissing
                | JpkError::HmacMismatch
                | JpkError::EntryHmacMismatch { .. } => INTEGRITY_FAILED,
                JpkError::EntryNotFound { .. } => NOT_FOUND,
                JpkError::UnknownHeader(_)
                | JpkError::HeaderTooLarge { .. }
                | JpkError::KeyTooLarge { .. }
                | JpkError::InvalidPrefix { .. }
                | JpkError::UnsafeKey { .. }
                | JpkError::MetaHmacAlreadyPresent => BAD_INPUT,
                JpkError::NotLoaded => NOT_LOADED,
                JpkError::Io(io_err) => match io_err.kind() {
                    std::io::ErrorKind::NotFound => NOT_FOUND,
                    std::io::ErrorKind::AlreadyExists => ALREADY_EXISTS,
                    _ => GENERAL_ERROR,
                },
            };
        }
    }
    GENERAL_ERROR
}
