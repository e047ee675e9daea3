//! Binary file metadata and the transfer handshake messages.

use crate::validation::{FieldError, not_empty};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type FileId = i64;

/// Size of one payload frame on the wire.
pub const CHUNK_SIZE: usize = 1024;

/// Text frame a client sends after the last payload frame of an upload.
pub const TRANSFER_COMPLETED: &str = "Binary data transfer completed";

/// Metadata of a stored file. `path` is storage-relative and never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryFile {
    pub id: FileId,
    pub file_name: String,
    pub size: u64,
    #[serde(skip)]
    pub path: String,
    pub created_at: DateTime<Utc>,
}

/// First message of an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub size: u64,
}

impl UploadRequest {
    /// # Errors
    /// Returns a [`FieldError`] for a blank name or a zero size.
    pub fn validate(&self) -> Result<(), FieldError> {
        not_empty("file_name", &self.file_name)?;
        if self.size == 0 {
            return Err(FieldError::new("size", "must be greater than zero"));
        }
        Ok(())
    }
}

/// First message of a download. Clients usually echo the full [`BinaryFile`];
/// unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub id: Option<FileId>,
    #[serde(default)]
    pub file_name: String,
}

impl DownloadRequest {
    /// # Errors
    /// Returns a [`FieldError`] when neither an id nor a name is given.
    pub fn validate(&self) -> Result<(), FieldError> {
        if self.id.is_some() {
            return Ok(());
        }
        not_empty("file_name", &self.file_name)
    }
}

/// Receiver acknowledgement; the sender streams only after `confirm: true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirm {
    pub confirm: bool,
}

/// Error body shared by HTTP responses and close frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
    pub status_code: u16,
}
