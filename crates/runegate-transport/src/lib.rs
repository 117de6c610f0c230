//! Listening sockets for Runegate.
//!
//! A [`Transport`] accepts clients and yields one [`Connection`] per
//! client. The connection gives up a plain byte stream; framing is the
//! protocol layer's job. [`TcpTransport`] is the implementation the
//! server uses.

#![allow(async_fn_in_trait)]

mod error;
mod tcp;

pub use error::TransportError;
pub use tcp::{TcpConnection, TcpTransport};

use std::fmt;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};

/// Process-unique number assigned to each accepted client.
///
/// Shows up in every log line about the connection, and ties an online
/// player back to the socket they logged in on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A source of client connections.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next client.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// The address clients should connect to.
    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

/// One accepted client, before its session starts.
///
/// Once [`into_stream`](Connection::into_stream) is called the session
/// owns the stream outright.
pub trait Connection: Send + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn id(&self) -> ConnectionId;

    /// `None` for streams that have no network peer.
    fn peer_addr(&self) -> Option<SocketAddr>;

    fn into_stream(self) -> Self::Stream;
}
