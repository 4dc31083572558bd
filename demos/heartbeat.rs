//! Heartbeat - both ends of an OCPP 1.6 connection in one process.
//!
//! This example demonstrates:
//! - Registering typed handlers on a central system and a charge point
//! - Outbound typed calls in both directions over one connection pair
//! - A handler that calls back to the peer that called it
//! - Observing answered calls and the close reason
//!
//! ```sh
//! RUST_LOG=ocpp_rpc=debug cargo run --example heartbeat
//! ```

use ocpp_rpc::transport::memory;
use ocpp_rpc::{CallContext, CallRegistry, Connection, DispatchedCall, HandlerError, Role, Variant};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct BootNotificationRequest {
    charge_point_vendor: String,
    charge_point_model: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct BootNotificationResponse {
    status: String,
    current_time: String,
    interval: u32,
}

#[derive(Serialize, Deserialize, Debug)]
struct HeartbeatRequest {}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct HeartbeatResponse {
    current_time: String,
}

const NOW: &str = "2024-01-01T00:00:00Z";

fn central_system() -> ocpp_rpc::Result<CallRegistry> {
    CallRegistry::builder()
        .handle(
            "BootNotification",
            Variant::V16,
            |req: BootNotificationRequest, ctx: CallContext| async move {
                tracing::info!(vendor = %req.charge_point_vendor, model = %req.charge_point_model, "boot");

                // Ask the station for its settings before accepting it.
                let config = ctx
                    .call("GetConfiguration", json!({ "key": ["HeartbeatInterval"] }))
                    .await?;
                tracing::info!(%config, "station configuration");

                Ok::<_, HandlerError>(BootNotificationResponse {
                    status: "Accepted".to_string(),
                    current_time: NOW.to_string(),
                    interval: 300,
                })
            },
        )
        .handle("Heartbeat", Variant::V16, |_: HeartbeatRequest, _| async {
            Ok::<_, HandlerError>(HeartbeatResponse {
                current_time: NOW.to_string(),
            })
        })
        .build()
}

fn charge_point() -> ocpp_rpc::Result<CallRegistry> {
    CallRegistry::builder()
        .handle_json("GetConfiguration", Variant::V16, |_, _| async {
            Ok(json!({
                "configurationKey": [
                    { "key": "HeartbeatInterval", "readonly": false, "value": "300" }
                ]
            }))
        })
        .build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let (csms_end, station_end) = memory::pair();

    let csms = Connection::builder()
        .registry(central_system()?)
        .variant(Variant::V16)
        .role(Role::CentralSystem)
        .peer_identity("CP-001")
        .on_call(|call: &DispatchedCall| {
            tracing::info!(action = %call.action, outcome = ?call.outcome, elapsed = ?call.elapsed, "csms answered");
        })
        .start(csms_end)?;

    let station = Connection::builder()
        .registry(charge_point()?)
        .subprotocol("ocpp1.6")
        .role(Role::ChargePoint)
        .peer_identity("CSMS")
        .start(station_end)?;

    let boot: BootNotificationResponse = station
        .call_typed(
            "BootNotification",
            &BootNotificationRequest {
                charge_point_vendor: "VendorX".to_string(),
                charge_point_model: "ModelY".to_string(),
            },
        )
        .await?;
    tracing::info!(status = %boot.status, interval = boot.interval, "boot accepted");

    for _ in 0..3 {
        let beat: HeartbeatResponse = station.call_typed("Heartbeat", &HeartbeatRequest {}).await?;
        tracing::info!(current_time = %beat.current_time, "heartbeat");
    }

    // A charge point may not send central system actions. The mismatch is
    // fatal and closes the station's end, which the central system sees.
    if let Err(e) = station.call("Reset", json!({ "type": "Soft" })).await {
        tracing::warn!(error = %e, "rejected locally");
    }

    let reason = csms.closed().await;
    tracing::info!(%reason, "central system side closed");

    Ok(())
}
