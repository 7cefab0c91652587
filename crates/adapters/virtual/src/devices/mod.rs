//! Simulated hardware reported by a virtual device when it pairs.

mod light;
mod sensor;

pub use light::VirtualLight;
pub use sensor::VirtualSensor;

use homehub_domain::entity::Entity;
use homehub_domain::error::HubError;
use homehub_domain::id::DeviceId;

/// Every entity of a virtual device: one light and one temperature sensor.
///
/// # Errors
///
/// Returns a validation error if a builder fails.
pub fn entities(device_id: &DeviceId) -> Result<Vec<Entity>, HubError> {
    let mut entities = VirtualLight::entities(device_id)?;
    entities.push(VirtualSensor::temperature(device_id)?);
    Ok(entities)
}
