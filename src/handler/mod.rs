//! Handler module - incoming Call handling.
//!
//! Provides:
//! - [`CallRegistry`] - maps (action, variant) to handlers, built once
//! - [`CallContext`] - describes the Call and gives access to the connection
//! - [`HandlerError`] - domain failure, answered as a CallError
//!
//! # Example
//!
//! ```
//! use ocpp_rpc::handler::{CallRegistry, HandlerError};
//! use ocpp_rpc::version::Variant;
//! use serde_json::json;
//!
//! let registry = CallRegistry::builder()
//!     .handle_json("Heartbeat", Variant::V16, |_, _ctx| async {
//!         Ok(json!({"currentTime": "2024-01-01T00:00:00Z"}))
//!     })
//!     .handle_json("Reset", Variant::V16, |_, _ctx| async {
//!         Err(HandlerError::not_supported("reset is disabled"))
//!     })
//!     .build()
//!     .unwrap();
//! assert_eq!(registry.len(), 2);
//! ```

mod context;
mod registry;

pub use context::{CallContext, HandlerError};
pub use registry::{
    BoxFuture, CallRegistry, Handler, HandlerResult, JsonHandler, PayloadValidator,
    RegistryBuilder, TypedHandler,
};
