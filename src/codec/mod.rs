//! Codec module - typed payload serialization.
//!
//! Frame payloads are JSON objects; [`JsonCodec`] converts them to and from
//! application types with `serde`.
//!
//! # Design
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! so the payload format is fixed at compile time.

mod json;

pub use json::JsonCodec;
