//! Protocol module - OCPP-J message framing.
//!
//! This module implements the JSON array envelope shared by all variants:
//! - message type ids and array arities
//! - typed [`Frame`]s with pure, non-panicking encode/decode
//! - the CallError code vocabulary with per-variant spelling

mod frame;
mod wire_format;

pub use frame::{Call, CallError, CallResult, Frame, MalformedFrame};
pub use wire_format::{
    ErrorCode, MessageType, CALL, CALL_ERROR, CALL_ERROR_LEN, CALL_LEN, CALL_RESULT,
    CALL_RESULT_LEN,
};
