//! Binary file storage for authenticated users.
//!
//! * [`TransferEngine`] runs the chunked upload and download protocol over any
//!   [`Transport`], compressing to disk and recording metadata only for
//!   complete uploads.
//! * [`FileService`] lists, describes and deletes stored files.

mod engine;
mod repository;
mod service;
mod transport;

pub use engine::TransferEngine;
pub use repository::BinaryFileRepository;
pub use service::FileService;
pub use transport::{ChannelTransport, CloseFrame, Frame, MAX_CLOSE_REASON, Transport, close_code};
