//! Interactive client for the keeper server.
//!
//! [`ApiClient`] wraps the HTTP routes and opens WebSocket transfers for
//! files; [`commands`] parses shell lines into calls on it and [`shell`] runs
//! them in a loop over standard input.

mod api;
pub mod commands;
mod error;
mod session;
pub mod shell;
mod socket;
pub mod transfer;

pub use api::{ApiClient, Resource};
pub use commands::{Command, Flow, Line};
pub use error::{ClientError, ClientErrorExt};
pub use session::Session;
pub use socket::SocketTransport;
