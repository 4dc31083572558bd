//! Error types for ocpp-rpc.

use std::time::Duration;

use thiserror::Error;

use crate::handler::HandlerError;
use crate::protocol::{CallError, MalformedFrame};
use crate::transport::TransportError;
use crate::version::Variant;

/// Main error type for all OCPP-J operations.
#[derive(Debug, Error)]
pub enum OcppError {
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A frame could not be decoded.
    #[error("malformed frame: {0}")]
    Malformed(#[from] MalformedFrame),

    /// No handler is registered for the action under the connection's variant.
    #[error("no handler for action {action} on {variant}")]
    UnknownAction { action: String, variant: Variant },

    /// A handler reported a domain failure.
    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),

    /// The peer answered a call with a CallError.
    #[error("peer returned {}: {}", .0.code, .0.description)]
    Remote(CallError),

    /// No response arrived before the call's deadline.
    #[error("call {action} ({id}) timed out after {timeout:?}")]
    Timeout {
        action: String,
        id: String,
        timeout: Duration,
    },

    /// Traffic inconsistent with the negotiated variant. Fatal to the connection.
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// The connection closed before the operation completed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The negotiated subprotocol is not an OCPP variant this crate speaks.
    #[error("unsupported OCPP variant: {0:?}")]
    UnsupportedVariant(String),

    /// Two handlers were registered for the same (action, variant).
    #[error("duplicate handler for action {action} on {variant}")]
    DuplicateHandler { action: String, variant: Variant },

    /// An outbound payload was rejected before it was sent.
    #[error("invalid payload for {action}: {reason}")]
    InvalidPayload { action: String, reason: String },

    /// A CallResult payload did not have the expected shape.
    #[error("invalid response to {action}: {reason}")]
    InvalidResponse { action: String, reason: String },

    /// Too many outbound calls are awaiting a response.
    #[error("too many pending calls ({0})")]
    TooManyPendingCalls(usize),

    /// Backpressure timeout - outbound queue full.
    #[error("backpressure timeout")]
    BackpressureTimeout,

    /// Transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Coarse error taxonomy shared by logs and observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedFrame,
    UnknownAction,
    HandlerFailure,
    Timeout,
    /// Absorbed where it happens: `resolve`/`reject` return `false` and log.
    /// No [`OcppError`] classifies as this kind.
    OrphanResponse,
    ProtocolMismatch,
    ConnectionClosed,
    /// Local misuse or resource limits (payload validation, limits, serialization).
    Usage,
    Transport,
}

impl OcppError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OcppError::Malformed(_) => ErrorKind::MalformedFrame,
            OcppError::UnknownAction { .. } => ErrorKind::UnknownAction,
            OcppError::Handler(_) | OcppError::Remote(_) | OcppError::InvalidResponse { .. } => {
                ErrorKind::HandlerFailure
            }
            OcppError::Timeout { .. } => ErrorKind::Timeout,
            OcppError::ProtocolMismatch(_) | OcppError::UnsupportedVariant(_) => {
                ErrorKind::ProtocolMismatch
            }
            OcppError::ConnectionClosed => ErrorKind::ConnectionClosed,
            OcppError::Json(_)
            | OcppError::DuplicateHandler { .. }
            | OcppError::InvalidPayload { .. }
            | OcppError::TooManyPendingCalls(_)
            | OcppError::BackpressureTimeout => ErrorKind::Usage,
            OcppError::Transport(_) => ErrorKind::Transport,
        }
    }

    /// True for [`OcppError::Timeout`].
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, OcppError::Timeout { .. })
    }

    /// True for [`OcppError::ConnectionClosed`].
    #[inline]
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, OcppError::ConnectionClosed)
    }

    /// The peer's CallError, if this is a [`OcppError::Remote`].
    pub fn remote(&self) -> Option<&CallError> {
        match self {
            OcppError::Remote(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type alias using OcppError.
pub type Result<T> = std::result::Result<T, OcppError>;
