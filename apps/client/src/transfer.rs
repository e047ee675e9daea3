//! Client half of the chunked file protocol.
//!
//! Written against [`Transport`] so the same code drives a real socket or an
//! in-memory peer.

use crate::error::ClientError;
use keeper_domain::file::{CHUNK_SIZE, Confirm, DownloadRequest, ErrorMessage, TRANSFER_COMPLETED, UploadRequest};
use keeper_transfer::{CloseFrame, Frame, Transport, close_code};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Sends `size` bytes from `source` as `file_name`. Returns once the server
/// has closed the connection normally.
///
/// # Errors
/// * [`ClientError::Rejected`] when the server refuses the file or fails to store it.
/// * [`ClientError::Transfer`] when the connection breaks.
/// * [`ClientError::Io`] when `source` cannot be read or yields a different size.
pub async fn send_file<T, R>(transport: &mut T, file_name: &str, size: u64, mut source: R) -> Result<(), ClientError>
where
    T: Transport,
    R: AsyncRead + Unpin,
{
    send_json(transport, &UploadRequest { file_name: file_name.to_owned(), size }).await?;
    await_confirm(transport).await?;

    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut sent = 0u64;
    loop {
        let n = source.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        sent += n as u64;
        if let Err(err) = transport.send(Frame::Binary(buffer[..n].to_vec())).await {
            return Err(explain_hangup(transport, err).await);
        }
    }
    if sent != size {
        return Err(ClientError::Io {
            source: std::io::Error::other(format!("file changed while sending: {sent} of {size} bytes")),
            context: Some(file_name.to_owned().into()),
        });
    }
    if let Err(err) = transport.send(Frame::Text(TRANSFER_COMPLETED.to_owned())).await {
        return Err(explain_hangup(transport, err).await);
    }
    debug!(file_name, sent, "Upload sent");

    loop {
        match transport.recv().await {
            Some(Ok(Frame::Close(frame))) => return closed(frame),
            Some(Ok(_)) => {},
            Some(Err(err)) => return Err(err.into()),
            None => return Err(ClientError::transfer("connection closed without a result")),
        }
    }
}

/// Asks for the file described by `request` and writes it to `sink`.
/// Returns the number of bytes written.
///
/// # Errors
/// * [`ClientError::Rejected`] when the server has no such file or fails to read it.
/// * [`ClientError::Transfer`] when the connection breaks.
/// * [`ClientError::Io`] when `sink` cannot be written.
pub async fn receive_file<T, W>(transport: &mut T, request: &DownloadRequest, mut sink: W) -> Result<u64, ClientError>
where
    T: Transport,
    W: AsyncWrite + Unpin,
{
    send_json(transport, request).await?;
    await_confirm(transport).await?;

    let mut received = 0u64;
    loop {
        match transport.recv().await {
            Some(Ok(Frame::Binary(chunk))) => {
                sink.write_all(&chunk).await?;
                received += chunk.len() as u64;
            },
            Some(Ok(Frame::Close(frame))) => {
                closed(frame)?;
                break;
            },
            Some(Ok(Frame::Text(text))) => debug!(frame = %text, "Ignoring text frame"),
            Some(Err(err)) => return Err(err.into()),
            None => return Err(ClientError::transfer("connection closed mid-download")),
        }
    }
    sink.flush().await?;
    Ok(received)
}

async fn send_json<T: Transport>(transport: &mut T, message: &impl Serialize) -> Result<(), ClientError> {
    transport.send(Frame::Text(serde_json::to_string(message)?)).await?;
    Ok(())
}

async fn await_confirm<T: Transport>(transport: &mut T) -> Result<(), ClientError> {
    match transport.recv().await {
        Some(Ok(Frame::Text(text))) => {
            let answer: Confirm = serde_json::from_str(&text)?;
            if answer.confirm { Ok(()) } else { Err(ClientError::transfer("server did not confirm the transfer")) }
        },
        Some(Ok(Frame::Close(frame))) => closed(frame).and(Err(ClientError::transfer("closed before confirming"))),
        Some(Ok(Frame::Binary(_))) => Err(ClientError::transfer("payload before confirmation")),
        Some(Err(err)) => Err(err.into()),
        None => Err(ClientError::transfer("connection closed before confirming")),
    }
}

/// A send failed; the server usually said why in a close frame first.
async fn explain_hangup<T: Transport>(transport: &mut T, err: keeper_kernel::KeeperError) -> ClientError {
    match transport.recv().await {
        Some(Ok(Frame::Close(frame))) => closed(frame).err().unwrap_or_else(|| err.into()),
        _ => err.into(),
    }
}

/// `Ok` for a normal close, the server's reason otherwise.
fn closed(frame: Option<CloseFrame>) -> Result<(), ClientError> {
    let Some(frame) = frame else {
        return Err(ClientError::transfer("connection closed without a status"));
    };
    if frame.code == close_code::NORMAL {
        return Ok(());
    }
    let message = serde_json::from_str::<ErrorMessage>(&frame.reason).map_or(frame.reason, |body| body.message);
    Err(ClientError::rejected(message, frame.code))
}
