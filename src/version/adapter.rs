//! Per-connection variant binding.

use std::sync::Arc;

use serde_json::Value;

use super::{ActionCatalog, Role, Variant};
use crate::error::{OcppError, Result};
use crate::handler::{CallRegistry, Handler, HandlerError};
use crate::protocol::{CallError, ErrorCode};

/// Binds a connection to one negotiated variant.
///
/// Inbound Calls are looked up in the variant's registry namespace; outbound
/// Calls are checked against the variant's action catalog and the registry's
/// outbound validators; error codes are spelled in the variant's dialect.
#[derive(Clone)]
pub struct VersionAdapter {
    variant: Variant,
    role: Option<Role>,
    registry: Arc<CallRegistry>,
}

impl VersionAdapter {
    pub fn new(variant: Variant, role: Option<Role>, registry: Arc<CallRegistry>) -> Self {
        Self {
            variant,
            role,
            registry,
        }
    }

    /// Bind to a negotiated subprotocol token.
    ///
    /// # Errors
    ///
    /// [`OcppError::UnsupportedVariant`] for anything but `ocpp1.6` and `ocpp2.0.1`.
    pub fn from_subprotocol(
        token: &str,
        role: Option<Role>,
        registry: Arc<CallRegistry>,
    ) -> Result<Self> {
        Ok(Self::new(Variant::from_subprotocol(token)?, role, registry))
    }

    #[inline]
    pub fn variant(&self) -> Variant {
        self.variant
    }

    #[inline]
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    #[inline]
    pub fn registry(&self) -> &CallRegistry {
        &self.registry
    }

    #[inline]
    pub fn catalog(&self) -> &'static ActionCatalog {
        ActionCatalog::for_variant(self.variant)
    }

    /// Handler for an inbound action in this variant's namespace.
    pub fn handler(&self, action: &str) -> Option<&dyn Handler> {
        self.registry.get(action, self.variant)
    }

    /// Check an outbound Call before it is sent.
    ///
    /// # Errors
    ///
    /// - [`OcppError::ProtocolMismatch`] if the action does not exist in this
    ///   variant, or may not be sent by the local role
    /// - [`OcppError::InvalidPayload`] if the payload is not an object or a
    ///   registered validator rejects it
    pub fn check_outbound(&self, action: &str, payload: &Value) -> Result<()> {
        let catalog = self.catalog();
        match self.role {
            Some(role) if !catalog.sendable_by(role, action) => {
                let reason = if catalog.contains(action) {
                    format!("{action} is not sent by a {role:?} on {}", self.variant)
                } else {
                    format!("{action} is not an {} action", self.variant)
                };
                return Err(OcppError::ProtocolMismatch(reason));
            }
            None if !catalog.contains(action) => {
                return Err(OcppError::ProtocolMismatch(format!(
                    "{action} is not an {} action",
                    self.variant
                )));
            }
            _ => {}
        }

        if !payload.is_object() {
            return Err(OcppError::InvalidPayload {
                action: action.to_string(),
                reason: "payload must be a JSON object".to_string(),
            });
        }

        for validate in self.registry.validators(action, self.variant) {
            validate(payload).map_err(|reason| OcppError::InvalidPayload {
                action: action.to_string(),
                reason,
            })?;
        }

        Ok(())
    }

    /// Spell an error code for this variant.
    pub fn render_code(&self, code: &ErrorCode) -> String {
        code.wire_name(self.variant).to_string()
    }

    /// Build the CallError answering `id` with a handler failure.
    pub fn error_frame(&self, id: impl Into<String>, error: &HandlerError) -> CallError {
        let details = if error.details.is_object() {
            error.details.clone()
        } else {
            serde_json::json!({})
        };
        CallError::new(
            id,
            self.render_code(&error.code),
            error.description.clone(),
            details,
        )
    }
}

impl std::fmt::Debug for VersionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionAdapter")
            .field("variant", &self.variant)
            .field("role", &self.role)
            .field("handlers", &self.registry.actions(self.variant).len())
            .finish()
    }
}
