//! [`Transport`] over a tungstenite client connection.

use crate::error::ClientError;
use crate::session::Session;
use futures::{SinkExt, StreamExt};
use keeper_kernel::KeeperError;
use keeper_transfer::{CloseFrame, Frame, Transport};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame as WsCloseFrame, frame::coding::CloseCode};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

#[derive(Debug)]
pub struct SocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl SocketTransport {
    /// Opens a socket to `path`, authenticated with the session token.
    ///
    /// # Errors
    /// * [`ClientError::Unauthorized`] without a session.
    /// * [`ClientError::Transfer`] when the upgrade fails.
    pub async fn connect(session: &Session, path: &str) -> Result<Self, ClientError> {
        let token = session
            .token()
            .ok_or_else(|| ClientError::Unauthorized { message: "sign in first".into(), context: None })?;
        let url = session.socket_endpoint(path)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::transfer(format!("building request for {url}: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| ClientError::Internal { message: e.to_string().into(), context: None })?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (stream, response) = tokio_tungstenite::connect_async(request).await.map_err(|e| match e {
            tungstenite::Error::Http(response) if response.status().as_u16() == 401 => {
                ClientError::Unauthorized { message: "session expired".into(), context: None }
            },
            other => ClientError::transfer(format!("connecting to {url}: {other}")),
        })?;
        debug!(status = %response.status(), url = %url, "Socket opened");
        Ok(Self { stream })
    }
}

impl Transport for SocketTransport {
    async fn recv(&mut self) -> Option<Result<Frame, KeeperError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(KeeperError::transport(format!("websocket read failed: {e}")))),
            };
            let frame = match message {
                Message::Text(text) => Frame::Text(text.as_str().to_owned()),
                Message::Binary(bytes) => Frame::Binary(bytes.to_vec()),
                Message::Close(close) => Frame::Close(
                    close.map(|c| CloseFrame { code: u16::from(c.code), reason: c.reason.as_str().to_owned() }),
                ),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };
            return Some(Ok(frame));
        }
    }

    async fn send(&mut self, frame: Frame) -> Result<(), KeeperError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(bytes) => Message::Binary(bytes.into()),
            Frame::Close(close) => {
                Message::Close(close.map(|c| WsCloseFrame { code: CloseCode::from(c.code), reason: c.reason.into() }))
            },
        };
        self.stream.send(message).await.map_err(|e| KeeperError::transport(format!("websocket write failed: {e}")))
    }
}
