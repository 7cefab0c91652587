//! Events drivers raise outside of a request (discovery, link changes,
//! readings). The daemon folds them into the device registry.

use crate::credentials::Credentials;
use crate::device::DeviceStatus;
use crate::entity::Entity;
use crate::id::DeviceId;
use crate::protocol::ProtocolTag;

/// A device advertised itself on the network.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceFound {
    pub device_id: DeviceId,
    pub protocol: ProtocolTag,
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    /// Connection hints learned from the advertisement (host, port, …).
    pub credentials: Option<Credentials>,
}

impl DeviceFound {
    #[must_use]
    pub fn new(device_id: DeviceId, protocol: ProtocolTag) -> Self {
        Self {
            device_id,
            protocol,
            name: None,
            manufacturer: None,
            model: None,
            credentials: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Something a driver observed.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    DeviceFound(DeviceFound),
    StatusChanged {
        device_id: DeviceId,
        status: DeviceStatus,
    },
    EntityReported(Entity),
}

impl DriverEvent {
    /// The device this event concerns.
    #[must_use]
    pub fn device_id(&self) -> &DeviceId {
        match self {
            Self::DeviceFound(found) => &found.device_id,
            Self::StatusChanged { device_id, .. } => device_id,
            Self::EntityReported(entity) => &entity.device_id,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DeviceFound(_) => "device_found",
            Self::StatusChanged { .. } => "status_changed",
            Self::EntityReported(_) => "entity_reported",
        }
    }
}
