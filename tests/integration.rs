//! Integration tests for ocpp-rpc framing and payload codecs.
//!
//! These tests verify the integration between the protocol, codec and
//! version modules without a running connection.

use ocpp_rpc::codec::JsonCodec;
use ocpp_rpc::protocol::{Call, CallError, CallResult, ErrorCode, Frame, MalformedFrame};
use ocpp_rpc::version::catalog::{ActionCatalog, Direction};
use ocpp_rpc::Variant;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Serialize, Deserialize, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
struct BootNotification16 {
    charge_point_vendor: String,
    charge_point_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    firmware_version: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
struct ChargingStation {
    model: String,
    vendor_name: String,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
struct BootNotification201 {
    charging_station: ChargingStation,
    reason: String,
}

/// Typed 1.6 payload through a full Call frame.
#[test]
fn test_v16_boot_notification_frame() {
    let request = BootNotification16 {
        charge_point_vendor: "VendorX".to_string(),
        charge_point_model: "ModelY".to_string(),
        firmware_version: None,
    };

    let payload = JsonCodec::to_value(&request).unwrap();
    let frame = Frame::Call(Call::new("1", "BootNotification", payload));
    let text = frame.encode();
    assert_eq!(
        text,
        r#"[2,"1","BootNotification",{"chargePointModel":"ModelY","chargePointVendor":"VendorX"}]"#
    );

    let Frame::Call(call) = Frame::decode(&text).unwrap() else {
        panic!("expected a Call");
    };
    assert_eq!(call.action, "BootNotification");
    let decoded: BootNotification16 = JsonCodec::from_value(call.payload).unwrap();
    assert_eq!(decoded, request);
}

/// Nested 2.0.1 payload round trip.
#[test]
fn test_v201_boot_notification_frame() {
    let request = BootNotification201 {
        charging_station: ChargingStation {
            model: "SingleSocketCharger".to_string(),
            vendor_name: "VendorX".to_string(),
        },
        reason: "PowerUp".to_string(),
    };

    let frame = Frame::Call(Call::new(
        "19223201",
        "BootNotification",
        JsonCodec::to_value(&request).unwrap(),
    ));
    let decoded = Frame::decode(&frame.encode()).unwrap();
    assert_eq!(decoded, frame);

    let Frame::Call(call) = decoded else {
        panic!("expected a Call");
    };
    let typed: BootNotification201 = JsonCodec::from_value(call.payload).unwrap();
    assert_eq!(typed, request);
}

/// All three frame kinds survive decode(encode(f)).
#[test]
fn test_frame_kinds_round_trip() {
    let frames = [
        Frame::Call(Call::new("7", "Heartbeat", json!({}))),
        Frame::CallResult(CallResult::new(
            "7",
            json!({"currentTime": "2024-01-01T00:00:00Z"}),
        )),
        Frame::CallError(CallError::new(
            "7",
            "NotImplemented",
            "unsupported",
            json!({}),
        )),
    ];

    for frame in frames {
        let text = frame.encode();
        assert_eq!(Frame::decode(&text).unwrap(), frame, "{text}");
        assert_eq!(Frame::decode_bytes(text.as_bytes()).unwrap(), frame);
    }
}

/// Error codes keep their dialect spelling on the wire.
#[test]
fn test_error_code_dialects() {
    let v16 = ErrorCode::FormatViolation.wire_name(Variant::V16).to_string();
    let v201 = ErrorCode::FormatViolation.wire_name(Variant::V201).to_string();
    assert_eq!(v16, "FormationViolation");
    assert_eq!(v201, "FormatViolation");

    let frame = Frame::CallError(CallError::new("3", v16, "bad", json!({})));
    let Frame::CallError(decoded) = Frame::decode(&frame.encode()).unwrap() else {
        panic!("expected a CallError");
    };
    assert_eq!(decoded.code, "FormationViolation");
    assert_eq!(decoded.error_code(), ErrorCode::FormatViolation);
}

/// Structural problems are reported, never panicked on.
#[test]
fn test_malformed_messages() {
    let cases = [
        ("", "not JSON"),
        ("{}", "not an array"),
        ("[]", "empty"),
        ("[9,\"1\",{}]", "unknown type"),
        ("[2,\"1\",\"Heartbeat\"]", "short Call"),
        ("[3,\"1\",\"ok\"]", "string payload"),
        ("[4,\"1\",\"GenericError\",\"\"]", "short CallError"),
        ("[2,1,\"Heartbeat\",{}]", "numeric id"),
    ];

    for (text, case) in cases {
        assert!(Frame::decode(text).is_err(), "{case} should not decode");
    }

    assert!(matches!(
        Frame::decode("[9,\"1\",{}]"),
        Err(MalformedFrame::UnknownMessageType(9))
    ));
    assert_eq!(
        Frame::decode("[3,\"42\",[]]").unwrap_err().message_id(),
        Some("42")
    );
}

/// An action known to one variant only.
#[test]
fn test_catalogs_differ_per_variant() {
    let v16 = ActionCatalog::for_variant(Variant::V16);
    let v201 = ActionCatalog::for_variant(Variant::V201);

    assert!(v16.allows("StartTransaction", Direction::ToCentralSystem));
    assert!(!v201.contains("StartTransaction"));
    assert!(v201.allows("TransactionEvent", Direction::ToCentralSystem));
    assert!(!v16.contains("TransactionEvent"));

    for catalog in [v16, v201] {
        assert!(catalog.allows("Heartbeat", Direction::ToCentralSystem));
        assert!(!catalog.allows("Heartbeat", Direction::ToChargePoint));
    }
}
