//! Device — a paired or discovered accessory known to the hub.

mod status;

pub use status::DeviceStatus;

use serde::{Deserialize, Serialize};

use crate::credentials::Credentials;
use crate::error::{InvalidTransition, ValidationError};
use crate::id::DeviceId;
use crate::protocol::ProtocolTag;
use crate::time::Timestamp;

/// A physical accessory bound to exactly one protocol.
///
/// `id` and `protocol` never change after creation; re-pairing under another
/// protocol produces a new device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub protocol: ProtocolTag,
    pub status: DeviceStatus,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub credentials: Option<Credentials>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub last_seen: Option<Timestamp>,
}

impl Device {
    /// Create a builder for constructing a [`Device`].
    #[must_use]
    pub fn builder() -> DeviceBuilder {
        DeviceBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] when `name` is blank.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        Ok(())
    }

    /// Move to `next`, enforcing the lifecycle state machine.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] and leaves the device untouched when the
    /// move is not allowed.
    pub fn transition(&mut self, next: DeviceStatus, at: Timestamp) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                device_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        if self.status != next {
            self.status = next;
            self.updated_at = at;
        }
        if next.is_reachable() {
            self.last_seen = Some(at);
        }
        Ok(())
    }

    /// Apply a partial update. Fields absent from `update` are preserved.
    ///
    /// # Errors
    ///
    /// Fails when the update names another device, switches protocol, or
    /// carries a status the state machine rejects. The device is left
    /// untouched on error.
    pub fn merge(&mut self, update: DeviceUpdate, at: Timestamp) -> Result<(), MergeError> {
        if update.protocol != self.protocol {
            return Err(ValidationError::ProtocolChanged {
                device_id: self.id.clone(),
                current: self.protocol.to_string(),
                requested: update.protocol.to_string(),
            }
            .into());
        }
        if self.status == DeviceStatus::Removed {
            return Err(InvalidTransition {
                device_id: self.id.clone(),
                from: self.status,
                to: update.status.unwrap_or(DeviceStatus::Removed),
            }
            .into());
        }

        let mut next = self.clone();
        if let Some(status) = update.status {
            if !next.status.can_transition_to(status) {
                return Err(InvalidTransition {
                    device_id: self.id.clone(),
                    from: self.status,
                    to: status,
                }
                .into());
            }
            next.status = status;
        }
        if let Some(name) = update.name {
            next.name = name;
        }
        if let Some(manufacturer) = update.manufacturer {
            next.manufacturer = Some(manufacturer);
        }
        if let Some(model) = update.model {
            next.model = Some(model);
        }
        if let Some(credentials) = update.credentials {
            next.credentials = Some(credentials);
        }
        next.validate()?;
        if next != *self {
            next.updated_at = at;
        }
        next.last_seen = Some(at);
        *self = next;
        Ok(())
    }
}

/// Errors from [`Device::merge`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MergeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

impl From<MergeError> for crate::error::HubError {
    fn from(err: MergeError) -> Self {
        match err {
            MergeError::Validation(err) => err.into(),
            MergeError::Transition(err) => err.into(),
        }
    }
}

/// Partial device snapshot for upserts.
///
/// `id` and `protocol` are mandatory; every other field is applied only when
/// present.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceUpdate {
    pub id: DeviceId,
    pub protocol: ProtocolTag,
    pub name: Option<String>,
    pub status: Option<DeviceStatus>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub credentials: Option<Credentials>,
}

impl DeviceUpdate {
    #[must_use]
    pub fn new(id: DeviceId, protocol: ProtocolTag) -> Self {
        Self {
            id,
            protocol,
            name: None,
            status: None,
            manufacturer: None,
            model: None,
            credentials: None,
        }
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn status(mut self, status: DeviceStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Materialise a brand-new device from this update.
    ///
    /// The name defaults to the id and the status to
    /// [`DeviceStatus::Discovered`].
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the resulting device is invalid.
    pub fn into_device(self, at: Timestamp) -> Result<Device, ValidationError> {
        let status = self.status.unwrap_or_default();
        let device = Device {
            name: self.name.unwrap_or_else(|| self.id.to_string()),
            id: self.id,
            protocol: self.protocol,
            status,
            manufacturer: self.manufacturer,
            model: self.model,
            credentials: self.credentials,
            created_at: at,
            updated_at: at,
            last_seen: Some(at),
        };
        device.validate()?;
        Ok(device)
    }
}

impl From<Device> for DeviceUpdate {
    fn from(device: Device) -> Self {
        Self {
            id: device.id,
            protocol: device.protocol,
            name: Some(device.name),
            status: Some(device.status),
            manufacturer: device.manufacturer,
            model: device.model,
            credentials: device.credentials,
        }
    }
}

/// Step-by-step builder for [`Device`].
#[derive(Debug, Default)]
pub struct DeviceBuilder {
    id: Option<DeviceId>,
    name: Option<String>,
    protocol: Option<ProtocolTag>,
    status: Option<DeviceStatus>,
    manufacturer: Option<String>,
    model: Option<String>,
    credentials: Option<Credentials>,
}

impl DeviceBuilder {
    #[must_use]
    pub fn id(mut self, id: DeviceId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn protocol(mut self, protocol: ProtocolTag) -> Self {
        self.protocol = Some(protocol);
        self
    }

    #[must_use]
    pub fn status(mut self, status: DeviceStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Consume the builder, validate, and return a [`Device`].
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the id or protocol is missing, or the
    /// name is blank.
    pub fn build(self) -> Result<Device, ValidationError> {
        let id = self.id.ok_or(ValidationError::EmptyDeviceId)?;
        let protocol = self.protocol.ok_or(ValidationError::EmptyProtocol)?;
        let mut update = DeviceUpdate::new(id, protocol);
        update.name = self.name;
        update.status = self.status;
        update.manufacturer = self.manufacturer;
        update.model = self.model;
        update.credentials = self.credentials;
        update.into_device(crate::time::now())
    }
}
