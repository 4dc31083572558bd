//! # ocpp-rpc
//!
//! Connection core for OCPP-J, the JSON-over-WebSocket RPC used between
//! charging stations and central systems.
//!
//! Both ends of a connection send Calls and answer them. This crate owns
//! everything between the WebSocket session and the application:
//!
//! - **Framing**: the `[2,id,action,payload]` / `[3,id,payload]` /
//!   `[4,id,code,description,details]` envelope ([`protocol`])
//! - **Inbound**: a registry of handlers keyed by (action, variant), run
//!   concurrently and answered with CallResult or CallError ([`handler`])
//! - **Outbound**: correlated calls with per-call timeouts ([`Connection::call`])
//! - **Variants**: `ocpp1.6` and `ocpp2.0.1`, picked by the negotiated
//!   subprotocol ([`version`])
//!
//! ## Example
//!
//! ```no_run
//! use ocpp_rpc::transport::WebSocketTransport;
//! use ocpp_rpc::{CallRegistry, Connection, HandlerError, Role, Variant};
//! use serde_json::json;
//!
//! # async fn serve(
//! #     ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
//! #     subprotocol: &str,
//! # ) -> ocpp_rpc::Result<()> {
//! let registry = CallRegistry::builder()
//!     .handle_json("Heartbeat", Variant::V16, |_, _| async {
//!         Ok(json!({ "currentTime": "2024-01-01T00:00:00Z" }))
//!     })
//!     .handle_json("Heartbeat", Variant::V201, |_, _| async {
//!         Ok(json!({ "currentTime": "2024-01-01T00:00:00Z" }))
//!     })
//!     .handle_json("DataTransfer", Variant::V16, |_, _| async {
//!         Err(HandlerError::not_supported("no vendor extensions"))
//!     })
//!     .build()?;
//!
//! let connection = Connection::builder()
//!     .registry(registry)
//!     .subprotocol(subprotocol)
//!     .role(Role::CentralSystem)
//!     .peer_identity("CP-1")
//!     .start(WebSocketTransport::new(ws))?;
//!
//! let reason = connection.closed().await;
//! tracing::info!(%reason, "charge point gone");
//! # Ok(())
//! # }
//! ```

pub mod backpressure;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod pending;
pub mod protocol;
pub mod transport;
pub mod version;
pub mod writer;

mod connection;
mod dispatcher;

pub use config::ConnectionConfig;
pub use connection::{CloseReason, Connection, ConnectionBuilder};
pub use dispatcher::{ConnectionObserver, DispatchOutcome, DispatchedCall};
pub use error::{ErrorKind, OcppError, Result};
pub use handler::{CallContext, CallRegistry, HandlerError};
pub use protocol::{Call, CallError, CallResult, ErrorCode, Frame};
pub use version::{Role, Variant};
