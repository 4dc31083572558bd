//! Standard action sets per variant and direction.
//!
//! 1.6 covers the core profile plus the security extension; 2.0.1 covers
//! the full action list. `DataTransfer` is valid in both directions.

use super::{Role, Variant};

/// Which way a call travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Charge point originates, central system handles.
    ToCentralSystem,
    /// Central system originates, charge point handles.
    ToChargePoint,
}

/// Actions known to one variant.
#[derive(Debug)]
pub struct ActionCatalog {
    variant: Variant,
    to_central_system: &'static [&'static str],
    to_charge_point: &'static [&'static str],
}

const V16_TO_CENTRAL_SYSTEM: &[&str] = &[
    "Authorize",
    "BootNotification",
    "DataTransfer",
    "DiagnosticsStatusNotification",
    "FirmwareStatusNotification",
    "Heartbeat",
    "LogStatusNotification",
    "MeterValues",
    "SecurityEventNotification",
    "SignCertificate",
    "SignedFirmwareStatusNotification",
    "StartTransaction",
    "StatusNotification",
    "StopTransaction",
];

const V16_TO_CHARGE_POINT: &[&str] = &[
    "CancelReservation",
    "CertificateSigned",
    "ChangeAvailability",
    "ChangeConfiguration",
    "ClearCache",
    "ClearChargingProfile",
    "DataTransfer",
    "DeleteCertificate",
    "ExtendedTriggerMessage",
    "GetCompositeSchedule",
    "GetConfiguration",
    "GetDiagnostics",
    "GetInstalledCertificateIds",
    "GetLocalListVersion",
    "GetLog",
    "InstallCertificate",
    "RemoteStartTransaction",
    "RemoteStopTransaction",
    "ReserveNow",
    "Reset",
    "SendLocalList",
    "SetChargingProfile",
    "SignedUpdateFirmware",
    "TriggerMessage",
    "UnlockConnector",
    "UpdateFirmware",
];

const V201_TO_CENTRAL_SYSTEM: &[&str] = &[
    "Authorize",
    "BootNotification",
    "ClearedChargingLimit",
    "DataTransfer",
    "FirmwareStatusNotification",
    "Get15118EVCertificate",
    "GetCertificateStatus",
    "Heartbeat",
    "LogStatusNotification",
    "MeterValues",
    "NotifyChargingLimit",
    "NotifyCustomerInformation",
    "NotifyDisplayMessages",
    "NotifyEVChargingNeeds",
    "NotifyEVChargingSchedule",
    "NotifyEvent",
    "NotifyMonitoringReport",
    "NotifyReport",
    "PublishFirmwareStatusNotification",
    "ReportChargingProfiles",
    "ReservationStatusUpdate",
    "SecurityEventNotification",
    "SignCertificate",
    "StatusNotification",
    "TransactionEvent",
];

const V201_TO_CHARGE_POINT: &[&str] = &[
    "CancelReservation",
    "CertificateSigned",
    "ChangeAvailability",
    "ClearCache",
    "ClearChargingProfile",
    "ClearDisplayMessage",
    "ClearVariableMonitoring",
    "CostUpdated",
    "CustomerInformation",
    "DataTransfer",
    "DeleteCertificate",
    "GetBaseReport",
    "GetChargingProfiles",
    "GetCompositeSchedule",
    "GetDisplayMessages",
    "GetInstalledCertificateIds",
    "GetLocalListVersion",
    "GetLog",
    "GetMonitoringReport",
    "GetReport",
    "GetTransactionStatus",
    "GetVariables",
    "InstallCertificate",
    "PublishFirmware",
    "RequestStartTransaction",
    "RequestStopTransaction",
    "ReserveNow",
    "Reset",
    "SendLocalList",
    "SetChargingProfile",
    "SetDisplayMessage",
    "SetMonitoringBase",
    "SetMonitoringLevel",
    "SetNetworkProfile",
    "SetVariableMonitoring",
    "SetVariables",
    "TriggerMessage",
    "UnlockConnector",
    "UnpublishFirmware",
    "UpdateFirmware",
];

static V16: ActionCatalog = ActionCatalog {
    variant: Variant::V16,
    to_central_system: V16_TO_CENTRAL_SYSTEM,
    to_charge_point: V16_TO_CHARGE_POINT,
};

static V201: ActionCatalog = ActionCatalog {
    variant: Variant::V201,
    to_central_system: V201_TO_CENTRAL_SYSTEM,
    to_charge_point: V201_TO_CHARGE_POINT,
};

impl ActionCatalog {
    /// Catalog for a variant.
    pub fn for_variant(variant: Variant) -> &'static ActionCatalog {
        match variant {
            Variant::V16 => &V16,
            Variant::V201 => &V201,
        }
    }

    #[inline]
    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Actions travelling in one direction.
    pub fn actions(&self, direction: Direction) -> &'static [&'static str] {
        match direction {
            Direction::ToCentralSystem => self.to_central_system,
            Direction::ToChargePoint => self.to_charge_point,
        }
    }

    /// True if the action exists in either direction.
    pub fn contains(&self, action: &str) -> bool {
        self.allows(action, Direction::ToCentralSystem)
            || self.allows(action, Direction::ToChargePoint)
    }

    /// True if the action may travel in the given direction.
    pub fn allows(&self, action: &str, direction: Direction) -> bool {
        self.actions(direction).contains(&action)
    }

    /// True if the role may originate the action.
    pub fn sendable_by(&self, role: Role, action: &str) -> bool {
        self.allows(action, role.sending_direction())
    }
}
