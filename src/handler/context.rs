//! Call context and handler errors.
//!
//! Every handler invocation receives a [`CallContext`] describing the
//! incoming Call and, when running inside a connection, a handle to that
//! connection for nested outbound calls:
//!
//! ```ignore
//! async fn on_boot(payload: Value, ctx: CallContext) -> HandlerResult {
//!     let conn = ctx.connection().ok_or_else(|| HandlerError::internal("detached"))?;
//!     conn.call("GetVariables", json!({"getVariableData": []})).await?;
//!     Ok(json!({"status": "Accepted", "interval": 300, "currentTime": now()}))
//! }
//! ```
//!
//! Handlers fail with a [`HandlerError`], which the dispatcher turns into a
//! CallError carrying the originating id.

use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;

use crate::connection::Connection;
use crate::error::{OcppError, Result};
use crate::protocol::ErrorCode;
use crate::version::Variant;

/// Domain failure reported by a handler.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code}: {description}")]
pub struct HandlerError {
    /// Code sent in the CallError (spelled per variant on the wire).
    pub code: ErrorCode,
    /// Human readable description.
    pub description: String,
    /// Error details object.
    pub details: Value,
}

impl HandlerError {
    pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
            details: json!({}),
        }
    }

    /// Attach a details object. Non-object values are wrapped as `{"detail": value}`.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = match details {
            Value::Object(_) => details,
            other => json!({ "detail": other }),
        };
        self
    }

    pub fn not_implemented(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotImplemented, description)
    }

    pub fn not_supported(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotSupported, description)
    }

    pub fn internal(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, description)
    }

    pub fn protocol(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProtocolError, description)
    }

    pub fn security(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::SecurityError, description)
    }

    pub fn format_violation(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::FormatViolation, description)
    }

    pub fn property_constraint(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::PropertyConstraintViolation, description)
    }

    pub fn generic(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::GenericError, description)
    }
}

/// Lets handlers use `?` on outbound calls and codec helpers.
impl From<OcppError> for HandlerError {
    fn from(err: OcppError) -> Self {
        match err {
            OcppError::Handler(inner) => inner,
            OcppError::Json(e) => HandlerError::format_violation(e.to_string()),
            other => HandlerError::internal(other.to_string()),
        }
    }
}

/// Context passed to call handlers.
///
/// Cheap to clone; safe to move into spawned tasks.
#[derive(Clone)]
pub struct CallContext {
    id: String,
    action: String,
    variant: Variant,
    peer: Arc<str>,
    connection: Option<Connection>,
}

impl CallContext {
    /// Create a context that is not attached to a connection (tests, direct invocation).
    pub fn new(id: impl Into<String>, action: impl Into<String>, variant: Variant) -> Self {
        Self {
            id: id.into(),
            action: action.into(),
            variant,
            peer: Arc::from(""),
            connection: None,
        }
    }

    pub(crate) fn attached(
        id: String,
        action: String,
        variant: Variant,
        peer: Arc<str>,
        connection: Connection,
    ) -> Self {
        Self {
            id,
            action,
            variant,
            peer,
            connection: Some(connection),
        }
    }

    /// Correlation id of the incoming Call.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Variant negotiated on the connection.
    #[inline]
    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Identity of the remote peer, empty when unknown.
    #[inline]
    pub fn peer_identity(&self) -> &str {
        &self.peer
    }

    /// The connection the Call arrived on.
    #[inline]
    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Issue a nested outbound call on the same connection.
    ///
    /// # Errors
    ///
    /// Returns [`OcppError::ConnectionClosed`] when the context is detached,
    /// otherwise whatever [`Connection::call`] returns.
    pub async fn call(&self, action: &str, payload: Value) -> Result<Value> {
        match &self.connection {
            Some(connection) => connection.call(action, payload).await,
            None => Err(OcppError::ConnectionClosed),
        }
    }
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("id", &self.id)
            .field("action", &self.action)
            .field("variant", &self.variant)
            .field("peer", &self.peer)
            .field("attached", &self.connection.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_accessors() {
        let ctx = CallContext::new("42", "Heartbeat", Variant::V201);
        assert_eq!(ctx.id(), "42");
        assert_eq!(ctx.action(), "Heartbeat");
        assert_eq!(ctx.variant(), Variant::V201);
        assert_eq!(ctx.peer_identity(), "");
        assert!(ctx.connection().is_none());

        let cloned = ctx.clone();
        assert_eq!(cloned.id(), ctx.id());
    }

    #[tokio::test]
    async fn test_detached_context_cannot_call() {
        let ctx = CallContext::new("1", "BootNotification", Variant::V16);
        let err = ctx.call("GetConfiguration", json!({})).await.unwrap_err();
        assert!(err.is_connection_closed());
    }

    #[test]
    fn test_handler_error_constructors() {
        let err = HandlerError::not_supported("no reservations");
        assert_eq!(err.code, ErrorCode::NotSupported);
        assert_eq!(err.details, json!({}));
        assert_eq!(err.to_string(), "NotSupported: no reservations");

        let err = HandlerError::property_constraint("bad connector")
            .with_details(json!({"connectorId": 7}));
        assert_eq!(err.details, json!({"connectorId": 7}));

        let err = HandlerError::generic("x").with_details(json!("raw"));
        assert_eq!(err.details, json!({"detail": "raw"}));
    }

    #[test]
    fn test_from_ocpp_error() {
        let inner = HandlerError::security("denied");
        assert_eq!(HandlerError::from(OcppError::Handler(inner.clone())), inner);

        let err = HandlerError::from(OcppError::ConnectionClosed);
        assert_eq!(err.code, ErrorCode::InternalError);
        assert_eq!(err.description, "connection closed");
    }
}
