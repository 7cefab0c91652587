//! Error types shared across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`HubError`] via
//! `#[from]` at the port boundary.

use std::fmt;
use std::time::Duration;

use crate::device::DeviceStatus;
use crate::entity::CapabilityKind;
use crate::id::DeviceId;
use crate::status::DaemonState;

/// Top-level error for every hub operation.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// A domain invariant was violated by the caller's input.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// No registry entry exists for the given id.
    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),

    /// No driver factory is registered for the protocol tag.
    #[error("unsupported protocol {0:?}")]
    UnsupportedProtocol(String),

    /// A device status change outside the lifecycle state machine.
    #[error("invalid transition")]
    InvalidTransition(#[from] InvalidTransition),

    /// A protocol driver failed.
    #[error("driver error")]
    Driver(#[from] DriverError),

    /// The backing store failed.
    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The backing store was not migrated to the schema this build expects.
    #[error("schema mismatch: expected version {expected}, found {}", display_version(.found.as_ref()))]
    SchemaMismatch { expected: i64, found: Option<i64> },

    /// `start` was called on a daemon that is already running.
    #[error("daemon is already running")]
    AlreadyRunning,

    /// The daemon is not in a state that allows the requested operation.
    #[error("daemon is {state}")]
    NotReady { state: DaemonState },
}

fn display_version(found: Option<&i64>) -> String {
    found.map_or_else(|| "none".to_string(), ToString::to_string)
}

impl HubError {
    /// Whether the error is a per-device driver fault, which degrades the
    /// device to `error` instead of stopping anything else.
    #[must_use]
    pub fn is_driver_fault(&self) -> bool {
        matches!(self, Self::Driver(_))
    }

    /// Whether the error is an infrastructure fault (storage or schema).
    #[must_use]
    pub fn is_storage_fault(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::SchemaMismatch { .. })
    }
}

/// Domain invariant violations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("device id must not be empty")]
    EmptyDeviceId,

    #[error("name must not be empty")]
    EmptyName,

    #[error("protocol tag must not be empty")]
    EmptyProtocol,

    #[error("entity key must not be empty")]
    EmptyEntityKey,

    #[error("{kind} bounds must set {fields} together or not at all")]
    PartialBounds {
        kind: CapabilityKind,
        fields: &'static str,
    },

    #[error("{kind} bounds are inconsistent: {reason}")]
    InvalidBounds {
        kind: CapabilityKind,
        reason: &'static str,
    },

    #[error("device {device_id} is bound to protocol {current:?}, cannot switch to {requested:?}")]
    ProtocolChanged {
        device_id: DeviceId,
        current: String,
        requested: String,
    },

    #[error("entity {key:?} is a {current} entity, cannot become {requested}")]
    CapabilityChanged {
        key: String,
        current: CapabilityKind,
        requested: CapabilityKind,
    },

    #[error("entity {key:?} expects a {expected} value")]
    ValueMismatch {
        key: String,
        expected: CapabilityKind,
    },

    #[error("entity {key:?} value {value} is outside {min}..={max}")]
    ValueOutOfRange {
        key: String,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// A device status change rejected by the lifecycle state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("device {device_id} cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub device_id: DeviceId,
    pub from: DeviceStatus,
    pub to: DeviceStatus,
}

/// The driver call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverOperation {
    Pair,
    Connect,
    Disconnect,
}

impl fmt::Display for DriverOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pair => f.write_str("pair"),
            Self::Connect => f.write_str("connect"),
            Self::Disconnect => f.write_str("disconnect"),
        }
    }
}

/// Failures reported by protocol drivers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// Network or protocol failure while talking to the device.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Credentials were missing or rejected by the device.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Commissioning did not complete.
    #[error("pairing failed: {reason}")]
    Pairing { reason: String },

    /// The call exceeded its time budget and was aborted.
    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout {
        operation: DriverOperation,
        after: Duration,
    },

    /// `connect` was called on a live session.
    #[error("session already connected")]
    AlreadyConnected,

    /// The call was aborted because the hub is shutting down.
    #[error("{0} cancelled by shutdown")]
    Cancelled(DriverOperation),

    /// The driver task panicked.
    #[error("driver crashed: {0}")]
    Crashed(String),
}

impl DriverError {
    /// Shorthand for [`DriverError::Pairing`].
    #[must_use]
    pub fn pairing(reason: impl Into<String>) -> Self {
        Self::Pairing {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_convert_validation_error_via_from() {
        let err: HubError = ValidationError::EmptyName.into();
        assert!(matches!(err, HubError::Validation(ValidationError::EmptyName)));
    }

    #[test]
    fn should_classify_driver_errors_as_driver_faults() {
        let err: HubError = DriverError::Connection("refused".to_string()).into();
        assert!(err.is_driver_fault());
        assert!(!err.is_storage_fault());
    }

    #[test]
    fn should_classify_schema_mismatch_as_storage_fault() {
        let err = HubError::SchemaMismatch {
            expected: 1,
            found: None,
        };
        assert!(err.is_storage_fault());
        assert_eq!(
            err.to_string(),
            "schema mismatch: expected version 1, found none"
        );
    }

    #[test]
    fn should_display_timeout_with_operation_and_duration() {
        let err = DriverError::Timeout {
            operation: DriverOperation::Connect,
            after: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "connect timed out after 250ms");
    }

    #[test]
    fn should_display_invalid_transition() {
        let err = InvalidTransition {
            device_id: DeviceId::new("dev-1").unwrap(),
            from: DeviceStatus::Discovered,
            to: DeviceStatus::Online,
        };
        assert_eq!(
            err.to_string(),
            "device dev-1 cannot move from discovered to online"
        );
    }
}
