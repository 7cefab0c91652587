//! Virtual light — on/off, brightness, white point and color.

use homehub_domain::entity::{Capability, Entity, EntityValue, Rgb};
use homehub_domain::error::HubError;
use homehub_domain::id::DeviceId;

/// A simulated color light.
pub struct VirtualLight;

impl VirtualLight {
    pub const POWER: &'static str = "light";
    pub const BRIGHTNESS: &'static str = "light_brightness";
    pub const COLOR_TEMP: &'static str = "light_color_temp";
    pub const COLOR: &'static str = "light_color";

    /// The light's entities in their initial (off, warm white) state.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a builder fails.
    pub fn entities(device_id: &DeviceId) -> Result<Vec<Entity>, HubError> {
        let entity = |key: &str, name: &str, capability: Capability, value: EntityValue| {
            Entity::builder()
                .device_id(device_id.clone())
                .key(key)
                .name(name)
                .capability(capability)
                .value(value)
                .build()
        };

        Ok(vec![
            entity(Self::POWER, "Virtual Light", Capability::OnOff, EntityValue::Bool(false))?,
            entity(
                Self::BRIGHTNESS,
                "Virtual Light brightness",
                Capability::brightness_percent(),
                EntityValue::Number(100.0),
            )?,
            entity(
                Self::COLOR_TEMP,
                "Virtual Light color temperature",
                Capability::color_temp_mireds(153, 500)?,
                EntityValue::Number(370.0),
            )?,
            entity(
                Self::COLOR,
                "Virtual Light color",
                Capability::Rgb,
                EntityValue::Rgb(Rgb {
                    r: 255,
                    g: 180,
                    b: 107,
                }),
            )?,
        ])
    }
}
