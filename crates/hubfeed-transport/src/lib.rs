//! Client transport abstraction layer for hubfeed.
//!
//! Provides the [`Transport`] and [`Connection`] traits: the minimal
//! capability surface a hub client needs from the network (connect, send,
//! receive, close). Any duplex byte-stream library can sit behind them;
//! no base class or hook methods are involved.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`
//! - `tls` (default): `wss://` endpoints through rustls with webpki roots
//!
//! # Why `impl Future + Send` instead of `async fn`?
//!
//! The hub client runs its receive loop on a spawned Tokio task, and
//! `tokio::spawn` requires `Send` futures. A plain `async fn` in a trait
//! makes no promise about `Send`, so the signatures spell it out.
//! Implementors can still write `async fn` in their `impl` blocks.

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::future::Future;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Opens outgoing connections to one fixed endpoint.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Opens a new connection to the endpoint.
    fn connect(
        &self,
    ) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;
}

/// A single connection that can send and receive bytes.
///
/// Methods take `&self` so one task can sit in [`recv`](Self::recv)
/// while others send.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends binary data to the remote peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Sends a text message to the remote peer.
    ///
    /// Defaults to sending the UTF-8 bytes through [`send`](Self::send).
    /// Transports with a distinct text frame type (e.g., WebSocket)
    /// should override this.
    fn send_text(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.send(text.as_bytes())
    }

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
