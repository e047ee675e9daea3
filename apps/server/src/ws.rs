//! [`Transport`] over an axum websocket.

use axum::extract::ws::{self, Message, WebSocket};
use keeper_kernel::KeeperError;
use keeper_transfer::{CloseFrame, Frame, Transport};

#[derive(Debug)]
pub(crate) struct SocketTransport {
    socket: WebSocket,
}

impl SocketTransport {
    pub(crate) const fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

impl Transport for SocketTransport {
    async fn recv(&mut self) -> Option<Result<Frame, KeeperError>> {
        loop {
            let message = match self.socket.recv().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(KeeperError::transport(format!("websocket read failed: {e}")))),
            };
            let frame = match message {
                Message::Text(text) => Frame::Text(text.as_str().to_owned()),
                Message::Binary(bytes) => Frame::Binary(bytes.to_vec()),
                Message::Close(close) => {
                    Frame::Close(close.map(|c| CloseFrame { code: c.code, reason: c.reason.as_str().to_owned() }))
                },
                // answered by axum
                Message::Ping(_) | Message::Pong(_) => continue,
            };
            return Some(Ok(frame));
        }
    }

    async fn send(&mut self, frame: Frame) -> Result<(), KeeperError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(bytes) => Message::Binary(bytes.into()),
            Frame::Close(close) => {
                Message::Close(close.map(|c| ws::CloseFrame { code: c.code, reason: c.reason.into() }))
            },
        };
        self.socket.send(message).await.map_err(|e| KeeperError::transport(format!("websocket write failed: {e}")))
    }
}
