//! Chunked upload and download over a [`Transport`].
//!
//! Both directions start with a JSON text frame naming the file, answered by
//! `{"confirm":true}`. Payload then flows as binary frames of at most
//! [`CHUNK_SIZE`] bytes. Each direction runs two tasks joined by a one-slot
//! channel: one talks to the socket, the other to the codec, so a slow disk
//! pushes back on the socket and vice versa.
//!
//! A failure before the confirm frame closes with 1003 unless the server itself
//! is at fault. Once the confirm frame is out, every failure closes with 1011.

use crate::repository::BinaryFileRepository;
use crate::transport::{CloseFrame, Frame, MAX_CLOSE_REASON, Transport, close_code};
use keeper_database::Database;
use keeper_domain::file::{
    BinaryFile, CHUNK_SIZE, Confirm, DownloadRequest, ErrorMessage, TRANSFER_COMPLETED, UploadRequest,
};
use keeper_domain::identity::UserId;
use keeper_kernel::{KeeperError, KeeperErrorExt, RequestContext};
use keeper_storage::{Compressor, Decompressor, PendingFile, Storage};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use tokio::fs::File;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Handshake,
    Stream,
}

#[derive(Debug)]
struct Failure {
    phase: Phase,
    error: KeeperError,
}

impl Failure {
    const fn handshake(error: KeeperError) -> Self {
        Self { phase: Phase::Handshake, error }
    }

    const fn stream(error: KeeperError) -> Self {
        Self { phase: Phase::Stream, error }
    }

    const fn close_code(&self) -> u16 {
        match (self.phase, self.error.is_client_error()) {
            (Phase::Handshake, true) => close_code::UNSUPPORTED_DATA,
            _ => close_code::INTERNAL,
        }
    }
}

/// An accepted upload: validated metadata and an open temporary file.
#[derive(Debug)]
struct Incoming {
    owner: UserId,
    request: UploadRequest,
    declared: i64,
    pending: PendingFile,
    file: File,
}

#[derive(Debug, Clone)]
pub struct TransferEngine {
    files: BinaryFileRepository,
    storage: Storage,
}

impl TransferEngine {
    #[must_use]
    pub const fn new(db: Database, storage: Storage) -> Self {
        Self { files: BinaryFileRepository::new(db), storage }
    }

    /// Receives one file from the peer and records it for the caller.
    ///
    /// The file becomes visible, on disk and in the table, only after the
    /// received byte count equals the declared size. The connection is closed
    /// with a normal close on success and with a JSON [`ErrorMessage`] reason
    /// otherwise.
    ///
    /// # Errors
    /// * [`KeeperError::Validation`] for bad metadata, a taken name or a size mismatch.
    /// * [`KeeperError::Transport`] when the peer breaks the protocol or disconnects.
    /// * [`KeeperError::Storage`] when writing fails.
    #[instrument(skip_all, fields(owner = ctx.owner()))]
    pub async fn upload<T: Transport>(
        &self,
        ctx: &mut RequestContext,
        transport: &mut T,
    ) -> Result<BinaryFile, KeeperError> {
        let result = match self.accept_upload(ctx, transport).await {
            Ok(incoming) => self.receive(ctx, incoming, transport).await.map_err(Failure::stream),
            Err(err) => Err(Failure::handshake(err)),
        };
        let file = conclude(transport, result).await?;
        info!(id = file.id, file_name = %file.file_name, size = file.size, "Upload completed");
        Ok(file)
    }

    /// Streams one of the caller's files to the peer, looked up by id or by name.
    ///
    /// # Errors
    /// * [`KeeperError::NotFound`] when the caller has no such file.
    /// * [`KeeperError::Transport`] when the peer disconnects mid-stream.
    /// * [`KeeperError::Storage`] when the stored file cannot be read or is corrupt.
    #[instrument(skip_all, fields(owner = ctx.owner()))]
    pub async fn download<T: Transport>(
        &self,
        ctx: &mut RequestContext,
        transport: &mut T,
    ) -> Result<BinaryFile, KeeperError> {
        let result = match self.accept_download(ctx, transport).await {
            Ok((record, file)) => send_file(record, self.storage.codec().decompressor(file), transport)
                .await
                .map_err(Failure::stream),
            Err(err) => Err(Failure::handshake(err)),
        };
        let file = conclude(transport, result).await?;
        info!(id = file.id, file_name = %file.file_name, size = file.size, "Download completed");
        Ok(file)
    }

    async fn accept_upload<T: Transport>(
        &self,
        ctx: &mut RequestContext,
        transport: &mut T,
    ) -> Result<Incoming, KeeperError> {
        let owner = ctx.require_owner()?;
        let request: UploadRequest = handshake(transport).await.context("Upload handshake")?;
        request.validate()?;
        let declared = i64::try_from(request.size).map_err(|_| KeeperError::validation("size is too large"))?;
        if self.files.find_by_name(ctx.db(), owner, &request.file_name).await?.is_some() {
            return Err(KeeperError::validation("file already exists"));
        }

        let (pending, file) = self.storage.owner(owner).create(&request.file_name).await?;
        send_json(transport, &Confirm { confirm: true }).await?;
        debug!(file_name = %request.file_name, size = request.size, "Upload accepted");
        Ok(Incoming { owner, request, declared, pending, file })
    }

    async fn receive<T: Transport>(
        &self,
        ctx: &mut RequestContext,
        incoming: Incoming,
        transport: &mut T,
    ) -> Result<BinaryFile, KeeperError> {
        let Incoming { owner, request, declared, pending, file } = incoming;
        let (tx, rx) = mpsc::channel(1);
        let compressor = self.storage.codec().compressor(file);
        tokio::try_join!(read_frames(transport, tx), write_blocks(rx, compressor, request.size))?;

        // Only the upload that published the name reaches the insert, so the
        // cleanup below never touches another upload's file.
        let stored = pending.commit().await?;
        let path = stored.to_string_lossy();
        match self.files.create(ctx.db(), owner, &request.file_name, &path, declared).await {
            Ok(file) => Ok(file),
            Err(err) => {
                if let Err(cleanup) = self.storage.owner(owner).remove(&stored).await {
                    warn!(path = %path, error = %cleanup, "Could not remove unrecorded upload");
                }
                if err.is_unique_violation() {
                    return Err(KeeperError::validation("file already exists"));
                }
                Err(err.into())
            },
        }
    }

    async fn accept_download<T: Transport>(
        &self,
        ctx: &mut RequestContext,
        transport: &mut T,
    ) -> Result<(BinaryFile, File), KeeperError> {
        let owner = ctx.require_owner()?;
        let request: DownloadRequest = handshake(transport).await.context("Download handshake")?;
        request.validate()?;
        let record = match request.id {
            Some(id) => self.files.get(ctx.db(), id, owner).await?,
            None => self.files.find_by_name(ctx.db(), owner, &request.file_name).await?,
        }
        .ok_or_else(|| KeeperError::not_found("file not found"))?;

        let file = self.storage.owner(owner).open(Path::new(&record.path)).await?;
        send_json(transport, &Confirm { confirm: true }).await?;
        Ok((record, file))
    }
}

async fn send_file<T: Transport>(
    record: BinaryFile,
    decompressor: Decompressor<File>,
    transport: &mut T,
) -> Result<BinaryFile, KeeperError> {
    let (tx, rx) = mpsc::channel(1);
    let (produced, ()) = tokio::try_join!(read_blocks(decompressor, tx), write_frames(transport, rx))?;
    if produced != record.size {
        return Err(KeeperError::storage(format!(
            "stored file {} yielded {produced} of {} bytes",
            record.id, record.size
        )));
    }
    Ok(record)
}

/// Sends the final close frame for `result`.
async fn conclude<T: Transport>(
    transport: &mut T,
    result: Result<BinaryFile, Failure>,
) -> Result<BinaryFile, KeeperError> {
    match result {
        Ok(file) => {
            close(transport, close_code::NORMAL, String::new()).await;
            Ok(file)
        },
        Err(failure) => {
            reject(transport, &failure).await;
            Err(failure.error)
        },
    }
}

async fn handshake<T: Transport, R: DeserializeOwned>(transport: &mut T) -> Result<R, KeeperError> {
    match transport.recv().await {
        Some(Ok(Frame::Text(text))) => {
            serde_json::from_str(&text).map_err(|e| KeeperError::validation(format!("malformed metadata: {e}")))
        },
        Some(Ok(Frame::Binary(_))) => Err(KeeperError::validation("expected a metadata text frame")),
        Some(Ok(Frame::Close(_))) | None => Err(KeeperError::transport("connection closed before the handshake")),
        Some(Err(err)) => Err(err),
    }
}

async fn send_json<T: Transport>(transport: &mut T, message: &impl Serialize) -> Result<(), KeeperError> {
    let text = serde_json::to_string(message).map_err(|e| KeeperError::internal(e.to_string()))?;
    transport.send(Frame::Text(text)).await
}

/// Socket side of an upload: forwards payload until the first text frame.
///
/// Any text frame ends the payload; the writer's size check decides whether
/// the upload is complete.
async fn read_frames<T: Transport>(transport: &mut T, tx: mpsc::Sender<Vec<u8>>) -> Result<(), KeeperError> {
    loop {
        match transport.recv().await {
            Some(Ok(Frame::Binary(chunk))) => {
                if tx.send(chunk).await.is_err() {
                    return Err(KeeperError::internal("file writer stopped"));
                }
            },
            Some(Ok(Frame::Text(text))) => {
                if text != TRANSFER_COMPLETED {
                    debug!(frame = %text, "Upload ended by a text frame");
                }
                return Ok(());
            },
            Some(Ok(Frame::Close(_))) | None => {
                return Err(KeeperError::transport("connection closed before the transfer completed"));
            },
            Some(Err(err)) => return Err(err),
        }
    }
}

/// Disk side of an upload: compresses chunks and enforces the declared size.
async fn write_blocks(
    mut rx: mpsc::Receiver<Vec<u8>>,
    mut compressor: Compressor<File>,
    declared: u64,
) -> Result<(), KeeperError> {
    while let Some(chunk) = rx.recv().await {
        compressor.write(&chunk).await?;
        if compressor.consumed() > declared {
            return Err(KeeperError::validation(format!("received more than the declared {declared} bytes")));
        }
    }

    let received = compressor.consumed();
    if received != declared {
        return Err(KeeperError::validation(format!("declared {declared} bytes, received {received}")));
    }
    let file = compressor.finish().await?;
    file.sync_all().await.map_err(|e| KeeperError::storage(format!("syncing upload: {e}")))?;
    Ok(())
}

/// Disk side of a download. Returns the number of bytes produced.
async fn read_blocks(mut decompressor: Decompressor<File>, tx: mpsc::Sender<Vec<u8>>) -> Result<u64, KeeperError> {
    while let Some(chunk) = decompressor.read_chunk(CHUNK_SIZE).await? {
        if tx.send(chunk).await.is_err() {
            return Err(KeeperError::internal("socket writer stopped"));
        }
    }
    Ok(decompressor.produced())
}

async fn write_frames<T: Transport>(transport: &mut T, mut rx: mpsc::Receiver<Vec<u8>>) -> Result<(), KeeperError> {
    while let Some(chunk) = rx.recv().await {
        transport.send(Frame::Binary(chunk)).await?;
    }
    Ok(())
}

async fn reject<T: Transport>(transport: &mut T, failure: &Failure) {
    let err = &failure.error;
    let code = failure.close_code();
    if err.is_client_error() {
        debug!(error = %err, code, "Transfer rejected");
    } else {
        warn!(error = %err, code, "Transfer failed");
    }

    let message = if err.is_client_error() { err.message() } else { "internal server error" };
    close(transport, code, close_reason(message, code)).await;
}

async fn close<T: Transport>(transport: &mut T, code: u16, reason: String) {
    if let Err(err) = transport.send(Frame::Close(Some(CloseFrame { code, reason }))).await {
        debug!(error = %err, "Close frame not delivered");
    }
}

/// JSON [`ErrorMessage`] that fits a close frame, shortening the message on a
/// character boundary when needed.
fn close_reason(message: &str, code: u16) -> String {
    let mut body = ErrorMessage { message: message.to_owned(), status_code: code };
    loop {
        let json = serde_json::to_string(&body).unwrap_or_default();
        if json.len() <= MAX_CLOSE_REASON || body.message.is_empty() {
            return json;
        }
        let excess = json.len() - MAX_CLOSE_REASON;
        let mut cut = body.message.len().saturating_sub(excess);
        while !body.message.is_char_boundary(cut) {
            cut -= 1;
        }
        body.message.truncate(cut);
    }
}
