//! Base types: message records, roles, the OCPP 1.6 action set and the
//! classification rules the queue engine applies to it.

use serde::{Deserialize, Serialize};

use crate::error::Error;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Number of slots in the outbound message pool
pub const TX_POOL_LEN: usize = 8;

/// Maximum message identifier length in bytes
pub const MESSAGE_ID_MAXLEN: usize = 36;

/// Default number of retries after the first transmission
pub const DEFAULT_TX_RETRIES: u32 = 1;

/// Default seconds a transmitted request may wait for a response
pub const DEFAULT_TX_TIMEOUT_SEC: u32 = 10;

// ============================================================================
// Basic Types
// ============================================================================

/// Timestamp in whole seconds, as reported by the host clock
pub type TimeSec = u64;

/// Bounded message identifier, correlates a CALL with its response
pub type MessageId = heapless::String<MESSAGE_ID_MAXLEN>;

// ============================================================================
// Roles
// ============================================================================

/// Direction/kind of a message on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Outbound or inbound request
    Call,
    /// Successful response
    CallResult,
    /// Failure response
    CallError,
}

// ============================================================================
// Actions
// ============================================================================

/// The closed OCPP 1.6 message type set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Action {
    Authorize,
    BootNotification,
    ChangeAvailability,
    ChangeConfiguration,
    ClearCache,
    DataTransfer,
    GetConfiguration,
    Heartbeat,
    MeterValues,
    RemoteStartTransaction,
    RemoteStopTransaction,
    Reset,
    StartTransaction,
    StatusNotification,
    StopTransaction,
    UnlockConnector,
    DiagnosticsStatusNotification,
    FirmwareStatusNotification,
    GetDiagnostics,
    UpdateFirmware,
    GetLocalListVersion,
    SendLocalList,
    CancelReservation,
    ReserveNow,
    ClearChargingProfile,
    GetCompositeSchedule,
    SetChargingProfile,
    TriggerMessage,
    CertificateSigned,
    DeleteCertificate,
    ExtendedTriggerMessage,
    GetInstalledCertificateIds,
    GetLog,
    InstallCertificate,
    LogStatusNotification,
    SecurityEventNotification,
    SignCertificate,
    SignedFirmwareStatusNotification,
    SignedUpdateFirmware,
}

impl Action {
    /// All message types, for table-driven lookup
    pub const ALL: [Action; 39] = [
        Action::Authorize,
        Action::BootNotification,
        Action::ChangeAvailability,
        Action::ChangeConfiguration,
        Action::ClearCache,
        Action::DataTransfer,
        Action::GetConfiguration,
        Action::Heartbeat,
        Action::MeterValues,
        Action::RemoteStartTransaction,
        Action::RemoteStopTransaction,
        Action::Reset,
        Action::StartTransaction,
        Action::StatusNotification,
        Action::StopTransaction,
        Action::UnlockConnector,
        Action::DiagnosticsStatusNotification,
        Action::FirmwareStatusNotification,
        Action::GetDiagnostics,
        Action::UpdateFirmware,
        Action::GetLocalListVersion,
        Action::SendLocalList,
        Action::CancelReservation,
        Action::ReserveNow,
        Action::ClearChargingProfile,
        Action::GetCompositeSchedule,
        Action::SetChargingProfile,
        Action::TriggerMessage,
        Action::CertificateSigned,
        Action::DeleteCertificate,
        Action::ExtendedTriggerMessage,
        Action::GetInstalledCertificateIds,
        Action::GetLog,
        Action::InstallCertificate,
        Action::LogStatusNotification,
        Action::SecurityEventNotification,
        Action::SignCertificate,
        Action::SignedFirmwareStatusNotification,
        Action::SignedUpdateFirmware,
    ];

    /// Wire name of the message type
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Authorize => "Authorize",
            Action::BootNotification => "BootNotification",
            Action::ChangeAvailability => "ChangeAvailability",
            Action::ChangeConfiguration => "ChangeConfiguration",
            Action::ClearCache => "ClearCache",
            Action::DataTransfer => "DataTransfer",
            Action::GetConfiguration => "GetConfiguration",
            Action::Heartbeat => "Heartbeat",
            Action::MeterValues => "MeterValues",
            Action::RemoteStartTransaction => "RemoteStartTransaction",
            Action::RemoteStopTransaction => "RemoteStopTransaction",
            Action::Reset => "Reset",
            Action::StartTransaction => "StartTransaction",
            Action::StatusNotification => "StatusNotification",
            Action::StopTransaction => "StopTransaction",
            Action::UnlockConnector => "UnlockConnector",
            Action::DiagnosticsStatusNotification => "DiagnosticsStatusNotification",
            Action::FirmwareStatusNotification => "FirmwareStatusNotification",
            Action::GetDiagnostics => "GetDiagnostics",
            Action::UpdateFirmware => "UpdateFirmware",
            Action::GetLocalListVersion => "GetLocalListVersion",
            Action::SendLocalList => "SendLocalList",
            Action::CancelReservation => "CancelReservation",
            Action::ReserveNow => "ReserveNow",
            Action::ClearChargingProfile => "ClearChargingProfile",
            Action::GetCompositeSchedule => "GetCompositeSchedule",
            Action::SetChargingProfile => "SetChargingProfile",
            Action::TriggerMessage => "TriggerMessage",
            Action::CertificateSigned => "CertificateSigned",
            Action::DeleteCertificate => "DeleteCertificate",
            Action::ExtendedTriggerMessage => "ExtendedTriggerMessage",
            Action::GetInstalledCertificateIds => "GetInstalledCertificateIds",
            Action::GetLog => "GetLog",
            Action::InstallCertificate => "InstallCertificate",
            Action::LogStatusNotification => "LogStatusNotification",
            Action::SecurityEventNotification => "SecurityEventNotification",
            Action::SignCertificate => "SignCertificate",
            Action::SignedFirmwareStatusNotification => "SignedFirmwareStatusNotification",
            Action::SignedUpdateFirmware => "SignedUpdateFirmware",
        }
    }

    /// Transaction-related messages are tied to a billing session and are
    /// never silently dropped.
    pub fn is_transaction_related(self) -> bool {
        matches!(
            self,
            Action::StartTransaction | Action::StopTransaction | Action::MeterValues
        )
    }

    /// Whether the retry policy may free the message once its attempt
    /// budget is exhausted.
    pub fn is_droppable(self) -> bool {
        !self.is_transaction_related() && self != Action::BootNotification
    }

    /// Whether overflow eviction may remove the message to make room.
    ///
    /// MeterValues is evictable even though it is not droppable: meter data
    /// may be sacrificed for a transaction-lifecycle message under memory
    /// pressure, but once queued it survives retry exhaustion.
    pub fn is_evictable(self) -> bool {
        !matches!(
            self,
            Action::BootNotification | Action::StartTransaction | Action::StopTransaction
        )
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| Error::UnknownAction(s.to_string()))
    }
}

// ============================================================================
// Message Record
// ============================================================================

/// A typed message record. The payload is an opaque byte blob owned by the
/// record; the core never inspects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Correlation identifier
    pub id: MessageId,
    /// Direction/kind
    pub role: Role,
    /// Message type
    pub action: Action,
    /// Opaque payload bytes
    pub payload: Vec<u8>,
}

impl Message {
    /// Create a request record with the given identifier
    pub fn call(id: MessageId, action: Action, payload: Vec<u8>) -> Self {
        Self {
            id,
            role: Role::Call,
            action,
            payload,
        }
    }

    /// Create a response record answering `req`
    pub fn response(req: &Message, payload: Vec<u8>, is_error: bool) -> Self {
        Self {
            id: req.id.clone(),
            role: if is_error {
                Role::CallError
            } else {
                Role::CallResult
            },
            action: req.action,
            payload,
        }
    }
}

// ============================================================================
// Lifecycle Events
// ============================================================================

/// Message lifecycle notification delivered to the host
#[derive(Debug)]
pub enum Event<'a> {
    /// A message was received from the central system. For responses this is
    /// delivered after the matching request left the wait queue.
    Incoming(&'a Message),
    /// Reserved; the engine does not currently raise it
    Outgoing(&'a Message),
    /// The slot is about to be released; the payload is no longer referenced
    /// once the callback returns
    Free(&'a Message),
    /// Receive-path failure tied to a specific message
    Failed {
        /// The message the failure relates to
        message: &'a Message,
        /// What went wrong
        error: Error,
    },
}
