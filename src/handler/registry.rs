//! Call registry keyed by (action, variant).
//!
//! The same action name carries different payload shapes on 1.6 and 2.0.1,
//! so each variant gets its own handler namespace. The registry is built once
//! and never mutated afterwards; duplicate keys are rejected by
//! [`RegistryBuilder::build`].
//!
//! # Example
//!
//! ```
//! use ocpp_rpc::handler::{CallRegistry, HandlerError};
//! use ocpp_rpc::version::Variant;
//! use serde::{Deserialize, Serialize};
//! use serde_json::{json, Value};
//!
//! #[derive(Deserialize)]
//! struct HeartbeatRequest {}
//!
//! #[derive(Serialize)]
//! #[serde(rename_all = "camelCase")]
//! struct HeartbeatResponse {
//!     current_time: String,
//! }
//!
//! let registry = CallRegistry::builder()
//!     .handle("Heartbeat", Variant::V201, |_: HeartbeatRequest, _ctx| async {
//!         Ok::<_, HandlerError>(HeartbeatResponse {
//!             current_time: "2024-01-01T00:00:00Z".into(),
//!         })
//!     })
//!     .handle_json("DataTransfer", Variant::V16, |_: Value, _ctx| async {
//!         Ok(json!({"status": "UnknownVendorId"}))
//!     })
//!     .build()
//!     .unwrap();
//!
//! assert!(registry.contains("Heartbeat", Variant::V201));
//! assert!(!registry.contains("Heartbeat", Variant::V16));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{CallContext, HandlerError};
use crate::codec::JsonCodec;
use crate::error::{OcppError, Result};
use crate::version::Variant;

/// Result type for handler functions: the CallResult payload or a domain error.
pub type HandlerResult = std::result::Result<Value, HandlerError>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outbound payload check run before a Call is sent.
pub type PayloadValidator = Arc<dyn Fn(&Value) -> std::result::Result<(), String> + Send + Sync>;

/// Trait for call handlers.
pub trait Handler: Send + Sync + 'static {
    /// Handle a Call payload.
    fn call(&self, payload: Value, ctx: CallContext) -> BoxFuture<'static, HandlerResult>;
}

/// Handler over raw JSON payloads.
pub struct JsonHandler<F, Fut> {
    handler: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> JsonHandler<F, Fut>
where
    F: Fn(Value, CallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Handler for JsonHandler<F, Fut>
where
    F: Fn(Value, CallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, payload: Value, ctx: CallContext) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.handler)(payload, ctx))
    }
}

/// Wrapper that deserializes the payload and serializes the response.
///
/// A payload that does not fit `T` is answered with `FormatViolation`
/// without running the handler.
pub struct TypedHandler<F, T, R, Fut> {
    handler: F,
    _phantom: PhantomData<fn(T) -> (R, Fut)>,
}

impl<F, T, R, Fut> TypedHandler<F, T, R, Fut>
where
    F: Fn(T, CallContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, R, Fut> Handler for TypedHandler<F, T, R, Fut>
where
    F: Fn(T, CallContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
{
    fn call(&self, payload: Value, ctx: CallContext) -> BoxFuture<'static, HandlerResult> {
        let parsed: T = match JsonCodec::from_value(payload) {
            Ok(v) => v,
            Err(e) => {
                let err = HandlerError::format_violation(format!(
                    "payload for {} does not match schema: {}",
                    ctx.action(),
                    e
                ));
                return Box::pin(async move { Err(err) });
            }
        };

        let fut = (self.handler)(parsed, ctx);
        Box::pin(async move {
            let response = fut.await?;
            JsonCodec::to_value(&response)
                .map_err(|e| HandlerError::internal(format!("response serialization failed: {e}")))
        })
    }
}

/// Read-only mapping from (action, variant) to handlers.
#[derive(Default)]
pub struct CallRegistry {
    handlers: HashMap<Variant, HashMap<String, Box<dyn Handler>>>,
    validators: HashMap<Variant, HashMap<String, Vec<PayloadValidator>>>,
}

impl CallRegistry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// A registry with no handlers; every Call is answered with UnknownAction.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up the handler for an action in a variant's namespace.
    pub fn get(&self, action: &str, variant: Variant) -> Option<&dyn Handler> {
        self.handlers
            .get(&variant)
            .and_then(|ns| ns.get(action))
            .map(|h| h.as_ref())
    }

    pub fn contains(&self, action: &str, variant: Variant) -> bool {
        self.get(action, variant).is_some()
    }

    /// Registered actions for a variant, sorted.
    pub fn actions(&self, variant: Variant) -> Vec<&str> {
        let mut actions: Vec<&str> = self
            .handlers
            .get(&variant)
            .map(|ns| ns.keys().map(String::as_str).collect())
            .unwrap_or_default();
        actions.sort_unstable();
        actions
    }

    /// Total number of registrations across variants.
    pub fn len(&self) -> usize {
        self.handlers.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Outbound validators for an action, in registration order.
    pub fn validators(&self, action: &str, variant: Variant) -> &[PayloadValidator] {
        self.validators
            .get(&variant)
            .and_then(|ns| ns.get(action))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Start the handler for a Call.
    ///
    /// # Errors
    ///
    /// Returns [`OcppError::UnknownAction`] if nothing is registered for the
    /// context's action under its variant.
    pub fn dispatch(
        &self,
        payload: Value,
        ctx: CallContext,
    ) -> Result<BoxFuture<'static, HandlerResult>> {
        let handler = self
            .get(ctx.action(), ctx.variant())
            .ok_or_else(|| OcppError::UnknownAction {
                action: ctx.action().to_string(),
                variant: ctx.variant(),
            })?;

        Ok(handler.call(payload, ctx))
    }
}

impl fmt::Debug for CallRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for variant in Variant::ALL {
            map.entry(&variant, &self.actions(variant));
        }
        map.finish()
    }
}

/// Fluent builder for [`CallRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    handlers: Vec<(String, Variant, Box<dyn Handler>)>,
    validators: Vec<(String, Variant, PayloadValidator)>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler.
    ///
    /// The payload is deserialized into `T`; the returned `R` becomes the
    /// CallResult payload.
    pub fn handle<F, T, R, Fut>(self, action: &str, variant: Variant, handler: F) -> Self
    where
        F: Fn(T, CallContext) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
    {
        self.register(action, variant, TypedHandler::new(handler))
    }

    /// Register a handler over raw JSON payloads.
    pub fn handle_json<F, Fut>(self, action: &str, variant: Variant, handler: F) -> Self
    where
        F: Fn(Value, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(action, variant, JsonHandler::new(handler))
    }

    /// Register any [`Handler`] implementation.
    pub fn register(mut self, action: &str, variant: Variant, handler: impl Handler) -> Self {
        self.handlers
            .push((action.to_string(), variant, Box::new(handler)));
        self
    }

    /// Register the same handler under several variants.
    pub fn handle_json_all<F, Fut>(mut self, action: &str, variants: &[Variant], handler: F) -> Self
    where
        F: Fn(Value, CallContext) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        for &variant in variants {
            self = self.handle_json(action, variant, handler.clone());
        }
        self
    }

    /// Check outbound payloads for `action` on `variant` before they are sent.
    ///
    /// Several validators for the same key all run, in registration order.
    pub fn validate_outbound<V>(mut self, action: &str, variant: Variant, validator: V) -> Self
    where
        V: Fn(&Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.validators
            .push((action.to_string(), variant, Arc::new(validator)));
        self
    }

    /// Freeze the registrations.
    ///
    /// # Errors
    ///
    /// Returns [`OcppError::DuplicateHandler`] for the first (action, variant)
    /// registered twice.
    pub fn build(self) -> Result<CallRegistry> {
        let mut registry = CallRegistry::default();

        for (action, variant, handler) in self.handlers {
            let namespace = registry.handlers.entry(variant).or_default();
            if namespace.contains_key(&action) {
                return Err(OcppError::DuplicateHandler { action, variant });
            }
            namespace.insert(action, handler);
        }

        for (action, variant, validator) in self.validators {
            registry
                .validators
                .entry(variant)
                .or_default()
                .entry(action)
                .or_default()
                .push(validator);
        }

        tracing::debug!(
            handlers = registry.len(),
            v16 = registry.actions(Variant::V16).len(),
            v201 = registry.actions(Variant::V201).len(),
            "call registry built"
        );

        Ok(registry)
    }
}
