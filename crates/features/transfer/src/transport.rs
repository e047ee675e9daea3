//! Message-oriented duplex the transfer engine speaks over.
//!
//! The HTTP layer adapts its websocket to [`Transport`]. [`ChannelTransport`]
//! is an in-process pair used by tests and by anything that wants to drive
//! the engine without a socket.

use keeper_kernel::KeeperError;
use std::future::Future;
use tokio::sync::mpsc;

/// Close codes the engine emits.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    /// Protocol violation or rejected metadata.
    pub const UNSUPPORTED_DATA: u16 = 1003;
    /// Storage or compression failure on the server.
    pub const INTERNAL: u16 = 1011;
}

/// Largest close reason a websocket control frame can carry.
pub const MAX_CLOSE_REASON: usize = 123;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Close(Option<CloseFrame>),
}

/// One side of an ordered, framed connection.
///
/// `recv` yields `None` once the peer is gone. Keep-alive frames never
/// surface here; adapters answer them themselves.
pub trait Transport: Send {
    fn recv(&mut self) -> impl Future<Output = Option<Result<Frame, KeeperError>>> + Send;

    /// # Errors
    /// [`KeeperError::Transport`] when the peer can no longer be reached.
    fn send(&mut self, frame: Frame) -> impl Future<Output = Result<(), KeeperError>> + Send;
}

/// In-memory transport backed by a pair of bounded channels.
#[derive(Debug)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Frame>,
    rx: mpsc::Receiver<Frame>,
}

impl ChannelTransport {
    /// Two connected ends; whatever one sends the other receives.
    #[must_use]
    pub fn pair(buffer: usize) -> (Self, Self) {
        let (left_tx, right_rx) = mpsc::channel(buffer.max(1));
        let (right_tx, left_rx) = mpsc::channel(buffer.max(1));
        (Self { tx: left_tx, rx: left_rx }, Self { tx: right_tx, rx: right_rx })
    }
}

impl Transport for ChannelTransport {
    async fn recv(&mut self) -> Option<Result<Frame, KeeperError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn send(&mut self, frame: Frame) -> Result<(), KeeperError> {
        self.tx.send(frame).await.map_err(|_| KeeperError::transport("peer hung up"))
    }
}
