//! Typed OCPP-J frames.
//!
//! A [`Frame`] is one decoded wire array. Decoding never panics: every
//! structural problem is reported as a [`MalformedFrame`].
//!
//! # Example
//!
//! ```
//! use ocpp_rpc::protocol::{Call, Frame};
//! use serde_json::json;
//!
//! let frame = Frame::Call(Call::new("19223201", "Heartbeat", json!({})));
//! let text = frame.encode();
//! assert_eq!(text, r#"[2,"19223201","Heartbeat",{}]"#);
//! assert_eq!(Frame::decode(&text).unwrap(), frame);
//! ```

use serde_json::{json, Value};
use thiserror::Error;

use super::wire_format::{ErrorCode, MessageType};

/// An outbound or inbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// Correlation id.
    pub id: String,
    /// Action name, e.g. `BootNotification`.
    pub action: String,
    /// Request payload (always a JSON object).
    pub payload: Value,
}

impl Call {
    pub fn new(id: impl Into<String>, action: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            action: action.into(),
            payload,
        }
    }
}

/// A successful response.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    /// Id of the originating Call.
    pub id: String,
    /// Response payload (always a JSON object).
    pub payload: Value,
}

impl CallResult {
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

/// An error response.
///
/// The code is kept exactly as it appears on the wire; use
/// [`CallError::error_code`] for the parsed form.
#[derive(Debug, Clone, PartialEq)]
pub struct CallError {
    /// Id of the originating Call.
    pub id: String,
    /// Error code as sent.
    pub code: String,
    /// Human readable description.
    pub description: String,
    /// Error details (always a JSON object).
    pub details: Value,
}

impl CallError {
    pub fn new(
        id: impl Into<String>,
        code: impl Into<String>,
        description: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            description: description.into(),
            details,
        }
    }

    /// Parsed error code.
    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::parse(&self.code)
    }
}

/// One OCPP-J message.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Call(Call),
    CallResult(CallResult),
    CallError(CallError),
}

/// Reasons a message could not be decoded into a [`Frame`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedFrame {
    #[error("message is not valid UTF-8")]
    InvalidUtf8,

    #[error("message is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("message is not a JSON array")]
    NotAnArray,

    #[error("message is an empty array")]
    Empty,

    #[error("message type id is not a non-negative integer")]
    InvalidMessageType,

    #[error("unknown message type id {0}")]
    UnknownMessageType(u64),

    #[error("{message_type} expects {expected} elements, found {found}")]
    WrongLength {
        message_type: MessageType,
        expected: usize,
        found: usize,
        id: Option<String>,
    },

    #[error("{message_type} element {index} must be {expected}")]
    WrongType {
        message_type: MessageType,
        index: usize,
        expected: &'static str,
        id: Option<String>,
    },
}

impl MalformedFrame {
    /// Correlation id of the offending message, when it could be read.
    pub fn message_id(&self) -> Option<&str> {
        match self {
            MalformedFrame::WrongLength { id, .. } | MalformedFrame::WrongType { id, .. } => {
                id.as_deref()
            }
            _ => None,
        }
    }
}

impl Frame {
    /// Correlation id.
    #[inline]
    pub fn id(&self) -> &str {
        match self {
            Frame::Call(call) => &call.id,
            Frame::CallResult(result) => &result.id,
            Frame::CallError(error) => &error.id,
        }
    }

    /// Message type tag.
    #[inline]
    pub fn message_type(&self) -> MessageType {
        match self {
            Frame::Call(_) => MessageType::Call,
            Frame::CallResult(_) => MessageType::CallResult,
            Frame::CallError(_) => MessageType::CallError,
        }
    }

    /// Build the wire array.
    pub fn to_value(&self) -> Value {
        match self {
            Frame::Call(call) => json!([MessageType::Call.id(), call.id, call.action, call.payload]),
            Frame::CallResult(result) => {
                json!([MessageType::CallResult.id(), result.id, result.payload])
            }
            Frame::CallError(error) => json!([
                MessageType::CallError.id(),
                error.id,
                error.code,
                error.description,
                error.details
            ]),
        }
    }

    /// Encode to the JSON text sent on the wire.
    pub fn encode(&self) -> String {
        self.to_value().to_string()
    }

    /// Decode a text message.
    pub fn decode(text: &str) -> Result<Frame, MalformedFrame> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| MalformedFrame::InvalidJson(e.to_string()))?;
        Self::from_value(value)
    }

    /// Decode a binary message holding UTF-8 JSON.
    pub fn decode_bytes(bytes: &[u8]) -> Result<Frame, MalformedFrame> {
        let text = std::str::from_utf8(bytes).map_err(|_| MalformedFrame::InvalidUtf8)?;
        Self::decode(text)
    }

    /// Decode an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Frame, MalformedFrame> {
        let Value::Array(items) = value else {
            return Err(MalformedFrame::NotAnArray);
        };

        let type_id = items
            .first()
            .ok_or(MalformedFrame::Empty)?
            .as_u64()
            .ok_or(MalformedFrame::InvalidMessageType)?;
        let message_type =
            MessageType::from_id(type_id).ok_or(MalformedFrame::UnknownMessageType(type_id))?;

        let id_hint = items.get(1).and_then(Value::as_str).map(str::to_owned);
        if items.len() != message_type.arity() {
            return Err(MalformedFrame::WrongLength {
                message_type,
                expected: message_type.arity(),
                found: items.len(),
                id: id_hint,
            });
        }

        let mut fields = Fields {
            message_type,
            id_hint,
            items: items.into_iter().enumerate().skip(1),
        };
        let id = fields.string()?;

        let frame = match message_type {
            MessageType::Call => {
                let action = fields.string()?;
                let payload = fields.object()?;
                Frame::Call(Call {
                    id,
                    action,
                    payload,
                })
            }
            MessageType::CallResult => Frame::CallResult(CallResult {
                id,
                payload: fields.object()?,
            }),
            MessageType::CallError => {
                let code = fields.string()?;
                let description = fields.string()?;
                let details = fields.object()?;
                Frame::CallError(CallError {
                    id,
                    code,
                    description,
                    details,
                })
            }
        };

        Ok(frame)
    }
}

/// Positional reader over the elements after the type id.
struct Fields<I> {
    message_type: MessageType,
    id_hint: Option<String>,
    items: I,
}

impl<I> Fields<I>
where
    I: Iterator<Item = (usize, Value)>,
{
    fn next(&mut self, expected: &'static str) -> Result<(usize, Value), MalformedFrame> {
        // Arity was checked before reading, so this only fires on a logic error.
        self.items.next().ok_or_else(|| self.wrong_type(0, expected))
    }

    fn string(&mut self) -> Result<String, MalformedFrame> {
        match self.next("a string")? {
            (_, Value::String(s)) => Ok(s),
            (index, _) => Err(self.wrong_type(index, "a string")),
        }
    }

    fn object(&mut self) -> Result<Value, MalformedFrame> {
        match self.next("an object")? {
            (_, value @ Value::Object(_)) => Ok(value),
            (index, _) => Err(self.wrong_type(index, "an object")),
        }
    }

    fn wrong_type(&self, index: usize, expected: &'static str) -> MalformedFrame {
        MalformedFrame::WrongType {
            message_type: self.message_type,
            index,
            expected,
            id: self.id_hint.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_call() {
        let frame = Frame::Call(Call::new("abc", "BootNotification", json!({"reason": "PowerUp"})));
        assert_eq!(
            frame.encode(),
            r#"[2,"abc","BootNotification",{"reason":"PowerUp"}]"#
        );
    }

    #[test]
    fn test_encode_call_result() {
        let frame = Frame::CallResult(CallResult::new(
            "abc",
            json!({"currentTime": "2024-01-01T00:00:00Z"}),
        ));
        assert_eq!(
            frame.encode(),
            r#"[3,"abc",{"currentTime":"2024-01-01T00:00:00Z"}]"#
        );
    }

    #[test]
    fn test_encode_call_error() {
        let frame = Frame::CallError(CallError::new("abc", "NotImplemented", "unsupported", json!({})));
        assert_eq!(frame.encode(), r#"[4,"abc","NotImplemented","unsupported",{}]"#);
    }

    #[test]
    fn test_decode_with_whitespace() {
        let frame = Frame::decode(r#"[ 2, "19223201", "Heartbeat", { } ]"#).unwrap();
        assert_eq!(frame, Frame::Call(Call::new("19223201", "Heartbeat", json!({}))));
        assert_eq!(frame.id(), "19223201");
        assert_eq!(frame.message_type(), MessageType::Call);
    }

    #[test]
    fn test_decode_call_error() {
        let frame = Frame::decode(r#"[4,"7","FormationViolation","bad",{"field":"x"}]"#).unwrap();
        let Frame::CallError(err) = frame else {
            panic!("expected CallError");
        };
        assert_eq!(err.code, "FormationViolation");
        assert_eq!(err.error_code(), ErrorCode::FormatViolation);
        assert_eq!(err.details, json!({"field": "x"}));
    }

    #[test]
    fn test_decode_bytes() {
        let frame = Frame::decode_bytes(br#"[3,"1",{}]"#).unwrap();
        assert_eq!(frame, Frame::CallResult(CallResult::new("1", json!({}))));

        assert_eq!(
            Frame::decode_bytes(&[0xff, 0xfe]),
            Err(MalformedFrame::InvalidUtf8)
        );
    }

    #[test]
    fn test_malformed_not_json() {
        assert!(matches!(
            Frame::decode("[2, \"1\", "),
            Err(MalformedFrame::InvalidJson(_))
        ));
    }

    #[test]
    fn test_malformed_not_array() {
        assert_eq!(
            Frame::decode(r#"{"id": 1}"#),
            Err(MalformedFrame::NotAnArray)
        );
        assert_eq!(Frame::decode("[]"), Err(MalformedFrame::Empty));
    }

    #[test]
    fn test_malformed_message_type() {
        assert_eq!(
            Frame::decode(r#"["2","1","Heartbeat",{}]"#),
            Err(MalformedFrame::InvalidMessageType)
        );
        assert_eq!(
            Frame::decode(r#"[2.5,"1","Heartbeat",{}]"#),
            Err(MalformedFrame::InvalidMessageType)
        );
        assert_eq!(
            Frame::decode(r#"[6,"1","Heartbeat",{}]"#),
            Err(MalformedFrame::UnknownMessageType(6))
        );
    }

    #[test]
    fn test_malformed_wrong_length_keeps_id() {
        let err = Frame::decode(r#"[2,"42","Heartbeat"]"#).unwrap_err();
        assert_eq!(
            err,
            MalformedFrame::WrongLength {
                message_type: MessageType::Call,
                expected: 4,
                found: 3,
                id: Some("42".to_string()),
            }
        );
        assert_eq!(err.message_id(), Some("42"));

        assert!(matches!(
            Frame::decode(r#"[3,"42",{},{}]"#),
            Err(MalformedFrame::WrongLength { found: 4, .. })
        ));
    }

    #[test]
    fn test_malformed_wrong_types() {
        // numeric id
        assert_eq!(
            Frame::decode(r#"[2,42,"Heartbeat",{}]"#),
            Err(MalformedFrame::WrongType {
                message_type: MessageType::Call,
                index: 1,
                expected: "a string",
                id: None,
            })
        );

        // payload must be an object
        let err = Frame::decode(r#"[2,"1","Heartbeat",[]]"#).unwrap_err();
        assert!(matches!(err, MalformedFrame::WrongType { index: 3, .. }));
        assert_eq!(err.message_id(), Some("1"));

        // details must be an object
        assert!(matches!(
            Frame::decode(r#"[4,"1","GenericError","x",null]"#),
            Err(MalformedFrame::WrongType { index: 4, .. })
        ));

        // description must be a string
        assert!(matches!(
            Frame::decode(r#"[4,"1","GenericError",5,{}]"#),
            Err(MalformedFrame::WrongType { index: 3, .. })
        ));
    }
}
