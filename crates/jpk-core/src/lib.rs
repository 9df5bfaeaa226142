//! Core container format for JPK single-file archives: byte codec,
//! crypto primitives, streaming transforms, on-disk record layouts, and
//! the `Archive`/`WriteSession`/`ExtractSession` operations built on top
//! of them.

pub mod archive;
pub mod block;
pub mod byte_codec;
pub mod crypto;
pub mod error;
pub mod extract_session;
mod ordered_map;
mod pipeline;
mod reader;
pub mod stream;
pub mod write_session;

pub use archive::{Archive, DirectoryEntry, HeaderValue, IndexEntry};
pub use error::{JpkError, Result};
pub use extract_session::{extract, ExtractOptions};
pub use write_session::{add, AddEntry, AddOptions, Source};
