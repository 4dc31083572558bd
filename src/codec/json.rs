//! JSON payload codec using `serde_json`.
//!
//! Frames carry payloads as [`serde_json::Value`]. This codec bridges those
//! values and application structs, so handlers and callers can work with
//! typed request/response bodies.
//!
//! # Example
//!
//! ```
//! use ocpp_rpc::codec::JsonCodec;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! #[serde(rename_all = "camelCase")]
//! struct HeartbeatResponse {
//!     current_time: String,
//! }
//!
//! let msg = HeartbeatResponse { current_time: "2024-01-01T00:00:00Z".to_string() };
//! let value = JsonCodec::to_value(&msg).unwrap();
//! assert_eq!(value["currentTime"], "2024-01-01T00:00:00Z");
//! let decoded: HeartbeatResponse = JsonCodec::from_value(value).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// JSON codec for structured payloads.
pub struct JsonCodec;

impl JsonCodec {
    /// Convert a value into a JSON tree.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn to_value<T: Serialize>(value: &T) -> Result<Value> {
        Ok(serde_json::to_value(value)?)
    }

    /// Convert a JSON tree into a typed value.
    ///
    /// # Errors
    ///
    /// Returns error if the tree does not match `T`.
    #[inline]
    pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
        Ok(serde_json::from_value(value)?)
    }

    /// Encode a value to JSON text.
    #[inline]
    pub fn encode<T: Serialize>(value: &T) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    /// Decode JSON text to a value.
    #[inline]
    pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OcppError;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    #[serde(rename_all = "camelCase")]
    struct BootNotificationRequest {
        reason: String,
        charging_station: ChargingStation,
    }

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    #[serde(rename_all = "camelCase")]
    struct ChargingStation {
        model: String,
        vendor_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        serial_number: Option<String>,
    }

    #[test]
    fn test_to_value_uses_wire_names() {
        let req = BootNotificationRequest {
            reason: "PowerUp".to_string(),
            charging_station: ChargingStation {
                model: "SingleSocketCharger".to_string(),
                vendor_name: "VendorX".to_string(),
                serial_number: None,
            },
        };

        let value = JsonCodec::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({
                "reason": "PowerUp",
                "chargingStation": {"model": "SingleSocketCharger", "vendorName": "VendorX"}
            })
        );
    }

    #[test]
    fn test_from_value_missing_field() {
        let result: Result<BootNotificationRequest> =
            JsonCodec::from_value(json!({"reason": "PowerUp"}));
        assert!(matches!(result, Err(OcppError::Json(_))));
    }

    #[test]
    fn test_encode_decode_text() {
        let text = JsonCodec::encode(&json!({"status": "Accepted"})).unwrap();
        assert_eq!(text, r#"{"status":"Accepted"}"#);

        let value: Value = JsonCodec::decode(&text).unwrap();
        assert_eq!(value["status"], "Accepted");
    }

    #[test]
    fn test_unit_like_payloads() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct HeartbeatRequest {}

        let value = JsonCodec::to_value(&HeartbeatRequest {}).unwrap();
        assert_eq!(value, json!({}));
        let back: HeartbeatRequest = JsonCodec::from_value(value).unwrap();
        assert_eq!(back, HeartbeatRequest {});
    }
}
