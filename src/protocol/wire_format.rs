//! Wire format constants and the OCPP-J error code vocabulary.
//!
//! Every OCPP-J message is a JSON array whose first element is the
//! message type id:
//! ```text
//! Call:       [2, "<id>", "<Action>", {<payload>}]
//! CallResult: [3, "<id>", {<payload>}]
//! CallError:  [4, "<id>", "<ErrorCode>", "<ErrorDescription>", {<details>}]
//! ```

use std::fmt;

use crate::version::Variant;

/// Message type id of a Call.
pub const CALL: u64 = 2;

/// Message type id of a CallResult.
pub const CALL_RESULT: u64 = 3;

/// Message type id of a CallError.
pub const CALL_ERROR: u64 = 4;

/// Element count of a Call array.
pub const CALL_LEN: usize = 4;

/// Element count of a CallResult array.
pub const CALL_RESULT_LEN: usize = 3;

/// Element count of a CallError array.
pub const CALL_ERROR_LEN: usize = 5;

/// Message type tag (first array element).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Call,
    CallResult,
    CallError,
}

impl MessageType {
    /// Map a numeric type id to a message type.
    pub fn from_id(id: u64) -> Option<Self> {
        match id {
            CALL => Some(Self::Call),
            CALL_RESULT => Some(Self::CallResult),
            CALL_ERROR => Some(Self::CallError),
            _ => None,
        }
    }

    /// Numeric type id.
    #[inline]
    pub fn id(self) -> u64 {
        match self {
            Self::Call => CALL,
            Self::CallResult => CALL_RESULT,
            Self::CallError => CALL_ERROR,
        }
    }

    /// Number of array elements this message type carries.
    #[inline]
    pub fn arity(self) -> usize {
        match self {
            Self::Call => CALL_LEN,
            Self::CallResult => CALL_RESULT_LEN,
            Self::CallError => CALL_ERROR_LEN,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Call => "Call",
            Self::CallResult => "CallResult",
            Self::CallError => "CallError",
        };
        f.write_str(name)
    }
}

/// CallError codes.
///
/// The set is the union of the 1.6 and 2.0.1 vocabularies. Use
/// [`ErrorCode::wire_name`] to spell a code in a given dialect and
/// [`ErrorCode::parse`] to read either spelling back.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Requested action is not known by the receiver.
    NotImplemented,
    /// Requested action is recognized but not supported.
    NotSupported,
    /// An internal error occurred while processing the action.
    InternalError,
    /// Payload for the action is incomplete.
    ProtocolError,
    /// The action could not be processed due to a security issue.
    SecurityError,
    /// Payload is syntactically incorrect (`FormationViolation` on 1.6).
    FormatViolation,
    /// A payload field carries an invalid value.
    PropertyConstraintViolation,
    /// A payload field violates occurrence constraints
    /// (`OccurenceConstraintViolation` on 1.6).
    OccurrenceConstraintViolation,
    /// A payload field violates data type constraints.
    TypeConstraintViolation,
    /// Any other error.
    GenericError,
    /// Message type id not supported (2.0.1 only).
    MessageTypeNotSupported,
    /// Content of the call is not a valid RPC request (2.0.1 only).
    RpcFrameworkError,
    /// No handler registered for the action on this connection's variant.
    UnknownAction,
    /// A code outside the known vocabulary, kept verbatim.
    Other(String),
}

impl ErrorCode {
    /// Parse a wire code. Both dialect spellings are accepted.
    pub fn parse(code: &str) -> Self {
        match code {
            "NotImplemented" => Self::NotImplemented,
            "NotSupported" => Self::NotSupported,
            "InternalError" => Self::InternalError,
            "ProtocolError" => Self::ProtocolError,
            "SecurityError" => Self::SecurityError,
            "FormatViolation" | "FormationViolation" => Self::FormatViolation,
            "PropertyConstraintViolation" => Self::PropertyConstraintViolation,
            "OccurrenceConstraintViolation" | "OccurenceConstraintViolation" => {
                Self::OccurrenceConstraintViolation
            }
            "TypeConstraintViolation" => Self::TypeConstraintViolation,
            "GenericError" => Self::GenericError,
            "MessageTypeNotSupported" => Self::MessageTypeNotSupported,
            "RpcFrameworkError" => Self::RpcFrameworkError,
            "UnknownAction" => Self::UnknownAction,
            other => Self::Other(other.to_string()),
        }
    }

    /// Spell this code as the given variant expects it on the wire.
    pub fn wire_name(&self, variant: Variant) -> &str {
        match (self, variant) {
            (Self::FormatViolation, Variant::V16) => "FormationViolation",
            (Self::OccurrenceConstraintViolation, Variant::V16) => "OccurenceConstraintViolation",
            (Self::MessageTypeNotSupported | Self::RpcFrameworkError, Variant::V16) => {
                "GenericError"
            }
            _ => self.canonical_name(),
        }
    }

    /// The 2.0.1 spelling.
    pub fn canonical_name(&self) -> &str {
        match self {
            Self::NotImplemented => "NotImplemented",
            Self::NotSupported => "NotSupported",
            Self::InternalError => "InternalError",
            Self::ProtocolError => "ProtocolError",
            Self::SecurityError => "SecurityError",
            Self::FormatViolation => "FormatViolation",
            Self::PropertyConstraintViolation => "PropertyConstraintViolation",
            Self::OccurrenceConstraintViolation => "OccurrenceConstraintViolation",
            Self::TypeConstraintViolation => "TypeConstraintViolation",
            Self::GenericError => "GenericError",
            Self::MessageTypeNotSupported => "MessageTypeNotSupported",
            Self::RpcFrameworkError => "RpcFrameworkError",
            Self::UnknownAction => "UnknownAction",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_ids() {
        assert_eq!(MessageType::from_id(2), Some(MessageType::Call));
        assert_eq!(MessageType::from_id(3), Some(MessageType::CallResult));
        assert_eq!(MessageType::from_id(4), Some(MessageType::CallError));
        assert_eq!(MessageType::from_id(5), None);
        assert_eq!(MessageType::from_id(0), None);

        for ty in [MessageType::Call, MessageType::CallResult, MessageType::CallError] {
            assert_eq!(MessageType::from_id(ty.id()), Some(ty));
        }
    }

    #[test]
    fn test_arity() {
        assert_eq!(MessageType::Call.arity(), 4);
        assert_eq!(MessageType::CallResult.arity(), 3);
        assert_eq!(MessageType::CallError.arity(), 5);
    }

    #[test]
    fn test_dialect_spelling() {
        assert_eq!(
            ErrorCode::FormatViolation.wire_name(Variant::V16),
            "FormationViolation"
        );
        assert_eq!(
            ErrorCode::FormatViolation.wire_name(Variant::V201),
            "FormatViolation"
        );
        assert_eq!(
            ErrorCode::OccurrenceConstraintViolation.wire_name(Variant::V16),
            "OccurenceConstraintViolation"
        );
        assert_eq!(
            ErrorCode::RpcFrameworkError.wire_name(Variant::V16),
            "GenericError"
        );
        assert_eq!(
            ErrorCode::RpcFrameworkError.wire_name(Variant::V201),
            "RpcFrameworkError"
        );
        assert_eq!(
            ErrorCode::NotImplemented.wire_name(Variant::V16),
            "NotImplemented"
        );
    }

    #[test]
    fn test_parse_accepts_both_spellings() {
        assert_eq!(ErrorCode::parse("FormationViolation"), ErrorCode::FormatViolation);
        assert_eq!(ErrorCode::parse("FormatViolation"), ErrorCode::FormatViolation);
        assert_eq!(
            ErrorCode::parse("OccurenceConstraintViolation"),
            ErrorCode::OccurrenceConstraintViolation
        );
        assert_eq!(
            ErrorCode::parse("VendorSpecific"),
            ErrorCode::Other("VendorSpecific".to_string())
        );
        assert_eq!(ErrorCode::parse("VendorSpecific").to_string(), "VendorSpecific");
    }
}
