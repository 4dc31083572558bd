//! Version module - protocol variant binding.
//!
//! A connection speaks exactly one OCPP variant, chosen by the WebSocket
//! subprotocol negotiated during the handshake:
//!
//! | Subprotocol  | Variant          |
//! |--------------|------------------|
//! | `ocpp1.6`    | [`Variant::V16`] |
//! | `ocpp2.0.1`  | [`Variant::V201`]|
//!
//! The [`VersionAdapter`] built from that variant decides which handler
//! namespace serves inbound calls, which actions may be sent, and how
//! error codes are spelled.
//!
//! # Example
//!
//! ```
//! use ocpp_rpc::version::Variant;
//!
//! let variant = Variant::from_subprotocol("ocpp2.0.1").unwrap();
//! assert_eq!(variant, Variant::V201);
//! assert!(Variant::from_subprotocol("ocpp2.1").is_err());
//! ```

mod adapter;
pub mod catalog;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{OcppError, Result};

pub use adapter::VersionAdapter;
pub use catalog::{ActionCatalog, Direction};

/// OCPP protocol variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Variant {
    /// OCPP 1.6 (JSON).
    #[serde(rename = "ocpp1.6")]
    V16,
    /// OCPP 2.0.1.
    #[serde(rename = "ocpp2.0.1")]
    V201,
}

impl Variant {
    /// Every supported variant, oldest first.
    pub const ALL: [Variant; 2] = [Variant::V16, Variant::V201];

    /// Resolve a negotiated subprotocol token.
    ///
    /// # Errors
    ///
    /// Returns [`OcppError::UnsupportedVariant`] for any other token.
    pub fn from_subprotocol(token: &str) -> Result<Self> {
        match token {
            "ocpp1.6" => Ok(Variant::V16),
            "ocpp2.0.1" => Ok(Variant::V201),
            other => Err(OcppError::UnsupportedVariant(other.to_string())),
        }
    }

    /// WebSocket subprotocol token.
    #[inline]
    pub fn subprotocol(self) -> &'static str {
        match self {
            Variant::V16 => "ocpp1.6",
            Variant::V201 => "ocpp2.0.1",
        }
    }

    /// Protocol version number.
    #[inline]
    pub fn version(self) -> &'static str {
        match self {
            Variant::V16 => "1.6",
            Variant::V201 => "2.0.1",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subprotocol())
    }
}

impl FromStr for Variant {
    type Err = OcppError;

    fn from_str(s: &str) -> Result<Self> {
        Variant::from_subprotocol(s)
    }
}

/// Which end of the link this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    /// Central system / CSMS.
    CentralSystem,
    /// Charge point / charging station.
    ChargePoint,
}

impl Role {
    /// The role on the other end.
    #[inline]
    pub fn peer(self) -> Role {
        match self {
            Role::CentralSystem => Role::ChargePoint,
            Role::ChargePoint => Role::CentralSystem,
        }
    }

    /// Direction of calls this role originates.
    #[inline]
    pub fn sending_direction(self) -> Direction {
        match self {
            Role::CentralSystem => Direction::ToChargePoint,
            Role::ChargePoint => Direction::ToCentralSystem,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subprotocol_round_trip() {
        for variant in Variant::ALL {
            assert_eq!(Variant::from_subprotocol(variant.subprotocol()).unwrap(), variant);
            assert_eq!(variant.to_string().parse::<Variant>().unwrap(), variant);
        }
    }

    #[test]
    fn test_unsupported_subprotocol() {
        for token in ["ocpp2.0", "ocpp2.1", "OCPP1.6", "", "ocpp1.5"] {
            let err = Variant::from_subprotocol(token).unwrap_err();
            assert!(matches!(err, OcppError::UnsupportedVariant(ref t) if t == token));
        }
    }

    #[test]
    fn test_serde_uses_subprotocol_token() {
        assert_eq!(serde_json::to_string(&Variant::V201).unwrap(), "\"ocpp2.0.1\"");
        let v: Variant = serde_json::from_str("\"ocpp1.6\"").unwrap();
        assert_eq!(v, Variant::V16);
    }

    #[test]
    fn test_role_direction() {
        assert_eq!(Role::CentralSystem.peer(), Role::ChargePoint);
        assert_eq!(
            Role::ChargePoint.sending_direction(),
            Direction::ToCentralSystem
        );
        assert_eq!(
            Role::CentralSystem.sending_direction(),
            Direction::ToChargePoint
        );
    }
}
