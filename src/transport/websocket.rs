//! `tokio-tungstenite` adapter.
//!
//! The handshake and subprotocol negotiation happen before a stream reaches
//! this adapter; [`negotiate_subprotocol`] and [`subprotocol_from_headers`]
//! help with that step.
//!
//! Inbound mapping:
//! - text messages pass through
//! - binary messages pass through when they hold UTF-8, otherwise dropped
//! - ping/pong and raw frames are skipped (tungstenite answers pings)
//! - close ends the stream

use std::pin::Pin;

use futures::future;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use super::{Transport, TransportError};
use crate::error::{OcppError, Result};
use crate::version::Variant;

/// Header carrying the negotiated subprotocol.
pub const SEC_WEBSOCKET_PROTOCOL: &str = "sec-websocket-protocol";

/// Boxed outbound half.
pub type WsSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Boxed inbound half.
pub type WsStream = Pin<Box<dyn Stream<Item = std::result::Result<String, TransportError>> + Send>>;

/// A negotiated WebSocket session.
pub struct WebSocketTransport<S> {
    inner: WebSocketStream<S>,
}

impl<S> WebSocketTransport<S> {
    pub fn new(inner: WebSocketStream<S>) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> WebSocketStream<S> {
        self.inner
    }
}

impl<S> From<WebSocketStream<S>> for WebSocketTransport<S> {
    fn from(inner: WebSocketStream<S>) -> Self {
        Self::new(inner)
    }
}

impl<S> Transport for WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Sink = WsSink;
    type Stream = WsStream;

    fn split(self) -> (WsSink, WsStream) {
        let (sink, stream) = self.inner.split();

        let sink = sink.with(|text: String| {
            future::ready(Ok::<_, TransportError>(Message::Text(text)))
        });

        let stream = stream.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        tracing::warn!("dropping binary message that is not UTF-8");
                        None
                    }
                },
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "websocket close received");
                    None
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
                Err(e) => Some(Err(TransportError::from(e))),
            })
        });

        (Box::pin(sink), Box::pin(stream))
    }
}

/// The single subprotocol token in a handshake response.
pub fn subprotocol_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Pick the first OCPP variant a client offers in its handshake request.
///
/// # Errors
///
/// Returns [`OcppError::UnsupportedVariant`] with the offered list when none
/// of the tokens is supported.
pub fn negotiate_subprotocol(headers: &HeaderMap) -> Result<Variant> {
    let offered: Vec<&str> = headers
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect();

    offered
        .iter()
        .find_map(|token| Variant::from_subprotocol(token).ok())
        .ok_or_else(|| OcppError::UnsupportedVariant(offered.join(",")))
}
