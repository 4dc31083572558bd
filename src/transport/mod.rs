//! Transport module - the seam between a connection and its WebSocket session.
//!
//! A connection consumes a transport as a pair of halves:
//! - a [`Sink`] of outbound text messages (`send`)
//! - a [`Stream`] of inbound text messages (`onMessage`); the end of the
//!   stream is `onClose`
//!
//! Provided transports:
//! - [`memory`] - in-process pair, used by tests and demos
//! - `websocket` - adapter for negotiated `tokio-tungstenite` streams
//!   (feature `websocket`)

pub mod memory;
#[cfg(feature = "websocket")]
pub mod websocket;

use futures::{Sink, Stream};
use thiserror::Error;

#[cfg(feature = "websocket")]
pub use websocket::{negotiate_subprotocol, subprotocol_from_headers, WebSocketTransport};

/// Transport-level failure.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The session is closed.
    #[error("transport closed")]
    Closed,

    /// I/O failure below the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol failure.
    #[cfg(feature = "websocket")]
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Any other failure, described.
    #[error("{0}")]
    Other(String),
}

/// A negotiated message transport.
///
/// Implementations hand over their two halves once; the connection owns them
/// for the rest of the session.
pub trait Transport: Send + 'static {
    /// Outbound half.
    type Sink: Sink<String, Error = TransportError> + Send + Unpin + 'static;
    /// Inbound half. Ends when the peer closes the session.
    type Stream: Stream<Item = Result<String, TransportError>> + Send + Unpin + 'static;

    /// Split into outbound and inbound halves.
    fn split(self) -> (Self::Sink, Self::Stream);
}
