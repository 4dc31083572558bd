//! Connection builder and handle.
//!
//! The [`ConnectionBuilder`] binds a registry, a negotiated variant and a
//! transport. Starting it spawns two tasks:
//! 1. the writer task, owner of the transport sink
//! 2. the dispatcher, reading the transport stream
//!
//! The returned [`Connection`] is a cheap handle onto both, used for outbound
//! calls and for closing.
//!
//! # Example
//!
//! ```
//! use ocpp_rpc::transport::memory;
//! use ocpp_rpc::{CallRegistry, Connection, Variant};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> ocpp_rpc::Result<()> {
//! let registry = CallRegistry::builder()
//!     .handle_json("Heartbeat", Variant::V201, |_, _| async {
//!         Ok(json!({ "currentTime": "2024-01-01T00:00:00Z" }))
//!     })
//!     .build()?;
//!
//! let (local, mut peer) = memory::pair();
//! let connection = Connection::builder()
//!     .registry(registry)
//!     .subprotocol("ocpp2.0.1")
//!     .peer_identity("CP-1")
//!     .start(local)?;
//!
//! peer.send_text(r#"[2,"1","Heartbeat",{}]"#)?;
//! let reply = peer.recv().await.unwrap();
//! assert_eq!(reply, r#"[3,"1",{"currentTime":"2024-01-01T00:00:00Z"}]"#);
//!
//! connection.close();
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::codec::JsonCodec;
use crate::config::ConnectionConfig;
use crate::dispatcher::{ConnectionObserver, DispatchedCall, Dispatcher};
use crate::error::{OcppError, Result};
use crate::handler::CallRegistry;
use crate::pending::PendingCallTable;
use crate::protocol::{Call, Frame};
use crate::transport::Transport;
use crate::version::{Role, Variant, VersionAdapter};
use crate::writer::{spawn_writer_task, WriterHandle};

/// Why a connection closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// [`Connection::close`] was called.
    LocalClose,
    /// The transport stream ended.
    PeerClosed,
    /// The transport failed.
    Transport(String),
    /// Too many malformed frames or orphan responses in a row.
    TooManyInvalidFrames(usize),
    /// A local call violated the negotiated variant.
    ProtocolMismatch(String),
    /// The writer task stopped.
    WriterFailed(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::LocalClose => f.write_str("closed locally"),
            CloseReason::PeerClosed => f.write_str("closed by peer"),
            CloseReason::Transport(e) => write!(f, "transport error: {e}"),
            CloseReason::TooManyInvalidFrames(n) => write!(f, "{n} invalid frames in a row"),
            CloseReason::ProtocolMismatch(e) => write!(f, "protocol mismatch: {e}"),
            CloseReason::WriterFailed(e) => write!(f, "writer failed: {e}"),
        }
    }
}

/// State shared by the handle, the dispatcher and handler tasks.
pub(crate) struct Shared {
    pub(crate) peer_identity: Arc<str>,
    pub(crate) adapter: VersionAdapter,
    pub(crate) pending: PendingCallTable,
    pub(crate) writer: WriterHandle,
    pub(crate) config: ConnectionConfig,
    pub(crate) observers: Vec<Arc<dyn ConnectionObserver>>,
    pub(crate) close_tx: watch::Sender<Option<CloseReason>>,
}

impl Shared {
    pub(crate) fn is_closed(&self) -> bool {
        self.close_tx.borrow().is_some()
    }

    /// Close once. Later reasons are ignored.
    ///
    /// Every pending call is failed with ConnectionClosed before this returns.
    pub(crate) fn shutdown(&self, reason: CloseReason) -> bool {
        let first = self.close_tx.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(reason.clone());
            true
        });
        if !first {
            return false;
        }

        let failed = self.pending.close_all();
        self.writer.close();

        tracing::info!(
            peer = %self.peer_identity,
            variant = %self.adapter.variant(),
            %reason,
            failed_calls = failed,
            "connection closed"
        );

        for observer in &self.observers {
            observer.on_close(&reason);
        }
        true
    }
}

/// Handle to a running connection.
///
/// Cheaply cloneable; all clones drive the same connection.
#[derive(Clone)]
pub struct Connection {
    pub(crate) shared: Arc<Shared>,
}

impl Connection {
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Send a Call and wait for its outcome, using the configured call timeout.
    ///
    /// # Errors
    ///
    /// - [`OcppError::Remote`] if the peer answered with a CallError
    /// - [`OcppError::Timeout`] if no answer arrived in time
    /// - [`OcppError::ConnectionClosed`] if the connection is or becomes closed
    /// - [`OcppError::ProtocolMismatch`] if the action does not belong to the
    ///   negotiated variant; the connection is closed as well
    /// - [`OcppError::InvalidPayload`] if the payload fails validation
    pub async fn call(&self, action: &str, payload: Value) -> Result<Value> {
        self.call_with_timeout(action, payload, self.shared.config.call_timeout)
            .await
    }

    /// Send a Call and wait for its outcome, up to `timeout`.
    pub async fn call_with_timeout(
        &self,
        action: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let shared = &self.shared;
        if shared.is_closed() {
            return Err(OcppError::ConnectionClosed);
        }

        if let Err(e) = shared.adapter.check_outbound(action, &payload) {
            if let OcppError::ProtocolMismatch(reason) = &e {
                tracing::error!(peer = %shared.peer_identity, action, %reason, "outbound protocol mismatch");
                shared.shutdown(CloseReason::ProtocolMismatch(reason.clone()));
            }
            return Err(e);
        }

        let writer = &shared.writer;
        shared
            .pending
            .submit(action, timeout, |id| async move {
                let frame = Frame::Call(Call::new(id, action, payload));
                writer.send(frame.encode()).await
            })
            .await
    }

    /// Send a typed request and deserialize the response.
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call), plus [`OcppError::InvalidResponse`] if the
    /// response payload does not deserialize into `Resp`.
    pub async fn call_typed<Req, Resp>(&self, action: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let payload = JsonCodec::to_value(request)?;
        let response = self.call(action, payload).await?;
        JsonCodec::from_value(response).map_err(|e| OcppError::InvalidResponse {
            action: action.to_string(),
            reason: e.to_string(),
        })
    }

    /// Close the connection.
    ///
    /// Every pending call has failed with ConnectionClosed when this returns.
    /// Frames already queued are still written before the transport closes.
    pub fn close(&self) {
        self.shared.shutdown(CloseReason::LocalClose);
    }

    /// Wait until the connection closes.
    pub async fn closed(&self) -> CloseReason {
        let mut rx = self.shared.close_tx.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(reason) = current {
                return reason;
            }
            if rx.changed().await.is_err() {
                return CloseReason::LocalClose;
            }
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Why the connection closed, if it has.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.shared.close_tx.borrow().clone()
    }

    #[inline]
    pub fn variant(&self) -> Variant {
        self.shared.adapter.variant()
    }

    #[inline]
    pub fn role(&self) -> Option<Role> {
        self.shared.adapter.role()
    }

    #[inline]
    pub fn peer_identity(&self) -> &str {
        &self.shared.peer_identity
    }

    /// Number of outbound calls awaiting a response.
    #[inline]
    pub fn pending_calls(&self) -> usize {
        self.shared.pending.len()
    }

    /// Ids of outbound calls awaiting a response.
    pub fn pending_ids(&self) -> Vec<String> {
        self.shared.pending.pending_ids()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.shared.peer_identity)
            .field("variant", &self.variant())
            .field("role", &self.role())
            .field("pending_calls", &self.pending_calls())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Builder for a [`Connection`].
pub struct ConnectionBuilder {
    registry: Arc<CallRegistry>,
    subprotocol: Option<String>,
    variant: Option<Variant>,
    peer_identity: String,
    role: Option<Role>,
    config: ConnectionConfig,
    observers: Vec<Arc<dyn ConnectionObserver>>,
}

impl ConnectionBuilder {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(CallRegistry::empty()),
            subprotocol: None,
            variant: None,
            peer_identity: String::new(),
            role: None,
            config: ConnectionConfig::default(),
            observers: Vec::new(),
        }
    }

    /// Handlers for inbound Calls. Defaults to an empty registry.
    pub fn registry(mut self, registry: impl Into<Arc<CallRegistry>>) -> Self {
        self.registry = registry.into();
        self
    }

    /// Negotiated WebSocket subprotocol token.
    ///
    /// Checked in [`start`](Self::start); takes precedence over [`variant`](Self::variant).
    pub fn subprotocol(mut self, token: impl Into<String>) -> Self {
        self.subprotocol = Some(token.into());
        self
    }

    pub fn variant(mut self, variant: Variant) -> Self {
        self.variant = Some(variant);
        self
    }

    /// Identity of the peer, used in logs and handed to handlers.
    pub fn peer_identity(mut self, identity: impl Into<String>) -> Self {
        self.peer_identity = identity.into();
        self
    }

    /// Local role. When set, outbound actions are restricted to its sending direction.
    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Default deadline for [`Connection::call`].
    /// Default: 30s
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Invalid frames tolerated in a row; 0 disables the check.
    /// Default: 10
    pub fn max_consecutive_invalid_frames(mut self, limit: usize) -> Self {
        self.config.max_consecutive_invalid_frames = limit;
        self
    }

    /// Incoming Calls handled at once.
    /// Default: 256
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.config.max_concurrent_handlers = limit;
        self
    }

    /// Outbound calls awaiting a response at once; 0 means unbounded.
    /// Default: 1024
    pub fn max_pending_calls(mut self, limit: usize) -> Self {
        self.config.max_pending_calls = limit;
        self
    }

    /// Queued outbound frames before senders wait.
    /// Default: 1024
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.config.writer.max_pending_frames = limit;
        self
    }

    /// How long a sender waits for the outbound queue.
    /// Default: 5s
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.config.writer.backpressure_timeout = timeout;
        self
    }

    /// Add an observer. May be called more than once.
    pub fn observer(mut self, observer: impl ConnectionObserver) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Add a callback run for every answered incoming Call.
    pub fn on_call<F>(self, callback: F) -> Self
    where
        F: Fn(&DispatchedCall) + Send + Sync + 'static,
    {
        self.observer(callback)
    }

    /// Start the connection over `transport`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`OcppError::UnsupportedVariant`] if the subprotocol is not supported or
    /// neither a subprotocol nor a variant was given. Nothing is spawned and
    /// the transport is dropped unread.
    pub fn start<T: Transport>(self, transport: T) -> Result<Connection> {
        let variant = match (&self.subprotocol, self.variant) {
            (Some(token), _) => Variant::from_subprotocol(token)?,
            (None, Some(variant)) => variant,
            (None, None) => {
                return Err(OcppError::UnsupportedVariant(
                    "no subprotocol negotiated".to_string(),
                ))
            }
        };

        let adapter = VersionAdapter::new(variant, self.role, self.registry);
        let (sink, stream) = transport.split();
        let (writer, writer_task) = spawn_writer_task(sink, self.config.writer.clone());
        let (close_tx, _) = watch::channel(None);

        let shared = Arc::new(Shared {
            peer_identity: Arc::from(self.peer_identity),
            adapter,
            pending: PendingCallTable::new(self.config.max_pending_calls),
            writer,
            config: self.config,
            observers: self.observers,
            close_tx,
        });
        let connection = Connection { shared };

        tracing::info!(
            peer = %connection.peer_identity(),
            %variant,
            role = ?connection.role(),
            "connection started"
        );

        let dispatcher = Dispatcher::new(connection.clone());
        tokio::spawn(dispatcher.run(stream, writer_task));

        Ok(connection)
    }
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
