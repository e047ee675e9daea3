//! Sandboxed file storage for uploaded binaries.
//!
//! * **Sandbox**: every path is normalized and checked against the canonical
//!   root, and owner views refuse paths that belong to another owner.
//! * **Atomic uploads**: bytes land in a uniquely named temporary file that is
//!   published only on [`PendingFile::commit`], which never replaces an existing
//!   file. Abandoned temporaries are deleted on drop, and stale ones are swept at
//!   start-up.
//! * **Streaming codec**: [`codec`] provides pooled LZ4 block compressors and
//!   decompressors that work over any async reader or writer.

pub mod codec;

mod builder;
mod engine;
mod error;
mod maintenance;
mod security;

pub use builder::{NoRoot, StorageBuilder, WithRoot};
pub use codec::{BLOCK_SIZE, CodecPool, Compressor, Decompressor};
pub use engine::{OwnerStorage, PendingFile, Storage};
pub use error::{StorageError, StorageErrorExt};
pub use maintenance::PurgeReport;
