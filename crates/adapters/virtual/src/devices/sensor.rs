//! Virtual temperature sensor.

use homehub_domain::entity::{Capability, Entity, EntityValue, NumericCapability};
use homehub_domain::error::HubError;
use homehub_domain::id::DeviceId;
use homehub_domain::time::Timestamp;

/// A simulated temperature sensor.
pub struct VirtualSensor;

impl VirtualSensor {
    pub const TEMPERATURE: &'static str = "temperature";
    pub const INITIAL_READING: f64 = 21.5;

    fn capability() -> Capability {
        Capability::Numeric(NumericCapability {
            unit: Some("\u{b0}C".to_string()),
            range: None,
            precision: Some(1),
        })
    }

    /// The temperature entity with its initial reading.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the builder fails.
    pub fn temperature(device_id: &DeviceId) -> Result<Entity, HubError> {
        Self::reading(device_id, Self::INITIAL_READING, homehub_domain::time::now())
    }

    /// A reading as the sensor would report it after connecting.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the builder fails.
    pub fn reading(device_id: &DeviceId, celsius: f64, at: Timestamp) -> Result<Entity, HubError> {
        Entity::builder()
            .device_id(device_id.clone())
            .key(Self::TEMPERATURE)
            .name("Virtual Temperature")
            .capability(Self::capability())
            .value(EntityValue::Number(celsius))
            .updated_at(at)
            .build()
    }
}
