//! CSMS server - accept OCPP charge points over WebSocket.
//!
//! This example demonstrates:
//! - Negotiating the `ocpp1.6` / `ocpp2.0.1` subprotocol during the handshake
//! - One registry serving both variants
//! - Per-connection configuration from the environment
//!
//! Stations connect to `ws://127.0.0.1:9000/<identity>`:
//!
//! ```sh
//! RUST_LOG=ocpp_rpc=debug cargo run --example csms_server
//! websocat --protocol ocpp2.0.1 ws://127.0.0.1:9000/CP-1
//! [2,"1","Heartbeat",{}]
//! ```

use std::sync::Arc;

use ocpp_rpc::transport::websocket::SEC_WEBSOCKET_PROTOCOL;
use ocpp_rpc::transport::{negotiate_subprotocol, WebSocketTransport};
use ocpp_rpc::{CallRegistry, Connection, ConnectionConfig, HandlerError, Role, Variant};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tracing_subscriber::EnvFilter;

const ADDR: &str = "127.0.0.1:9000";

fn now() -> Value {
    json!({ "currentTime": "2024-01-01T00:00:00Z" })
}

fn registry() -> ocpp_rpc::Result<CallRegistry> {
    CallRegistry::builder()
        .handle_json_all("Heartbeat", &Variant::ALL, |_, _| async { Ok(now()) })
        .handle_json("BootNotification", Variant::V16, |_, _| async {
            Ok(json!({ "status": "Accepted", "currentTime": "2024-01-01T00:00:00Z", "interval": 300 }))
        })
        .handle_json("BootNotification", Variant::V201, |_, _| async {
            Ok(json!({ "status": "Accepted", "currentTime": "2024-01-01T00:00:00Z", "interval": 300 }))
        })
        .handle_json("DataTransfer", Variant::V16, |_, _| async {
            Err(HandlerError::not_supported("no vendor extensions"))
        })
        .build()
}

async fn accept(
    stream: TcpStream,
    registry: Arc<CallRegistry>,
    config: ConnectionConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut negotiated = None;
    let mut identity = String::new();

    let callback = |request: &Request, mut response: Response| {
        identity = request.uri().path().trim_start_matches('/').to_string();
        match negotiate_subprotocol(request.headers()) {
            Ok(variant) => {
                response.headers_mut().insert(
                    SEC_WEBSOCKET_PROTOCOL,
                    HeaderValue::from_static(variant.subprotocol()),
                );
                negotiated = Some(variant);
                Ok(response)
            }
            Err(e) => {
                let mut rejection = ErrorResponse::new(Some(e.to_string()));
                *rejection.status_mut() = StatusCode::BAD_REQUEST;
                Err(rejection)
            }
        }
    };
    let ws = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
    let Some(variant) = negotiated else {
        return Ok(());
    };

    let connection = Connection::builder()
        .registry(registry)
        .variant(variant)
        .role(Role::CentralSystem)
        .peer_identity(identity)
        .config(config)
        .start(WebSocketTransport::new(ws))?;

    let reason = connection.closed().await;
    tracing::info!(peer = %connection.peer_identity(), %reason, "station disconnected");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let registry = Arc::new(registry()?);
    let config = ConnectionConfig::from_env();

    let listener = TcpListener::bind(ADDR).await?;
    tracing::info!(addr = ADDR, "listening");

    loop {
        let (stream, addr) = listener.accept().await?;
        let registry = registry.clone();
        let config = config.clone();
        tokio::spawn(async move {
            if let Err(e) = accept(stream, registry, config).await {
                tracing::warn!(%addr, error = %e, "handshake failed");
            }
        });
    }
}
