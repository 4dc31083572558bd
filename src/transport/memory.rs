//! In-process transport.
//!
//! [`pair`] returns two connected endpoints. Either can be handed to a
//! connection, or driven by hand to play a raw peer:
//!
//! ```
//! use ocpp_rpc::transport::memory;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (a, mut b) = memory::pair();
//! a.send_text(r#"[2,"1","Heartbeat",{}]"#).unwrap();
//! assert_eq!(b.recv().await.unwrap(), r#"[2,"1","Heartbeat",{}]"#);
//! # }
//! ```

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::mpsc;
use futures::{Sink, Stream, StreamExt};

use super::{Transport, TransportError};

type Message = Result<String, TransportError>;

/// One end of an in-memory session.
#[derive(Debug)]
pub struct MemoryTransport {
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
}

/// Create two connected endpoints.
pub fn pair() -> (MemoryTransport, MemoryTransport) {
    let (a_tx, b_rx) = mpsc::unbounded();
    let (b_tx, a_rx) = mpsc::unbounded();
    (
        MemoryTransport { tx: a_tx, rx: a_rx },
        MemoryTransport { tx: b_tx, rx: b_rx },
    )
}

impl MemoryTransport {
    /// Deliver a text message to the other end.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.tx
            .unbounded_send(Ok(text.into()))
            .map_err(|_| TransportError::Closed)
    }

    /// Make the other end's inbound stream yield an error.
    pub fn fail(&self, error: TransportError) -> Result<(), TransportError> {
        self.tx
            .unbounded_send(Err(error))
            .map_err(|_| TransportError::Closed)
    }

    /// Next text message from the other end, `None` once it closed its
    /// outbound half. Injected failures are skipped.
    pub async fn recv(&mut self) -> Option<String> {
        while let Some(message) = self.rx.next().await {
            if let Ok(text) = message {
                return Some(text);
            }
        }
        None
    }

    /// Close the outbound half; the other end sees end-of-stream.
    pub fn close(&self) {
        self.tx.close_channel();
    }

    /// True once the other end stopped receiving.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Transport for MemoryTransport {
    type Sink = MemorySink;
    type Stream = MemoryStream;

    fn split(self) -> (MemorySink, MemoryStream) {
        (MemorySink(self.tx), MemoryStream(self.rx))
    }
}

/// Outbound half of a [`MemoryTransport`].
#[derive(Debug)]
pub struct MemorySink(mpsc::UnboundedSender<Message>);

impl Sink<String> for MemorySink {
    type Error = TransportError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.0.is_closed() {
            Poll::Ready(Err(TransportError::Closed))
        } else {
            Poll::Ready(Ok(()))
        }
    }

    fn start_send(self: Pin<&mut Self>, item: String) -> Result<(), Self::Error> {
        self.0
            .unbounded_send(Ok(item))
            .map_err(|_| TransportError::Closed)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.0.close_channel();
        Poll::Ready(Ok(()))
    }
}

/// Inbound half of a [`MemoryTransport`].
#[derive(Debug)]
pub struct MemoryStream(mpsc::UnboundedReceiver<Message>);

impl Stream for MemoryStream {
    type Item = Message;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        self.get_mut().0.poll_next_unpin(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;

    #[tokio::test]
    async fn test_pair_is_bidirectional() {
        let (mut a, mut b) = pair();

        a.send_text("to b").unwrap();
        b.send_text("to a").unwrap();

        assert_eq!(b.recv().await.as_deref(), Some("to b"));
        assert_eq!(a.recv().await.as_deref(), Some("to a"));
    }

    #[tokio::test]
    async fn test_split_halves() {
        let (a, mut b) = pair();
        let (mut sink, mut stream) = a.split();

        sink.send("hello".to_string()).await.unwrap();
        assert_eq!(b.recv().await.as_deref(), Some("hello"));

        b.send_text("world").unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "world");
    }

    #[tokio::test]
    async fn test_close_ends_peer_stream() {
        let (a, b) = pair();
        let (_sink, mut stream) = b.split();

        a.close();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_sink_fails_after_peer_drop() {
        let (a, b) = pair();
        let (mut sink, _stream) = a.split();
        drop(b);

        let err = sink.send("lost".to_string()).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let (a, b) = pair();
        let (_sink, mut stream) = b.split();

        a.fail(TransportError::Other("reset".into())).unwrap();
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "reset");
    }
}
