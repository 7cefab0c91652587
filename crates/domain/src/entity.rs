//! Entity — one controllable or observable facet of a device.
//!
//! An entity is exclusively owned by its device and addressed by
//! `(device_id, key)`. Its capability kind is fixed at creation.

mod capability;
mod value;

pub use capability::{
    BrightnessCapability, BrightnessUnit, Capability, CapabilityKind, ColorTempCapability,
    ColorTempUnit, MiredRange, NumericCapability, NumericRange, Range,
};
pub use value::{EntityValue, Rgb};

use serde::{Deserialize, Serialize};

use crate::error::{HubError, ValidationError};
use crate::id::DeviceId;
use crate::time::Timestamp;

/// A single facet of a device (a sensor reading, an actuator, …).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub device_id: DeviceId,
    pub key: String,
    pub name: String,
    capability: Capability,
    pub value: Option<EntityValue>,
    pub updated_at: Timestamp,
}

impl Entity {
    /// Create a builder for constructing an [`Entity`].
    #[must_use]
    pub fn builder() -> EntityBuilder {
        EntityBuilder::default()
    }

    #[must_use]
    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    #[must_use]
    pub fn kind(&self) -> CapabilityKind {
        self.capability.kind()
    }

    #[must_use]
    pub fn unit(&self) -> Option<&str> {
        self.capability.unit()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the key is empty or the current value
    /// does not fit the capability.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.key.trim().is_empty() {
            return Err(ValidationError::EmptyEntityKey);
        }
        if let Some(value) = &self.value {
            self.accepts(value)?;
        }
        Ok(())
    }

    /// Check whether `value` is representable by this entity's capability.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ValueMismatch`] for a value of the wrong
    /// shape and [`ValidationError::ValueOutOfRange`] for a number outside the
    /// declared bounds.
    pub fn accepts(&self, value: &EntityValue) -> Result<(), ValidationError> {
        let mismatch = || ValidationError::ValueMismatch {
            key: self.key.clone(),
            expected: self.kind(),
        };
        let out_of_range = |value: f64, min: f64, max: f64| ValidationError::ValueOutOfRange {
            key: self.key.clone(),
            value,
            min,
            max,
        };

        match (&self.capability, value) {
            (Capability::OnOff, EntityValue::Bool(_)) | (Capability::Rgb, EntityValue::Rgb(_)) => {
                Ok(())
            }
            (Capability::Numeric(numeric), EntityValue::Number(n)) => match numeric.range {
                Some(range) if !range.contains(*n) => Err(out_of_range(*n, range.min(), range.max())),
                _ => Ok(()),
            },
            (Capability::Brightness(brightness), EntityValue::Number(n)) => {
                match brightness.range {
                    Some(range) if !range.contains(*n) => {
                        Err(out_of_range(*n, range.min(), range.max()))
                    }
                    None if *n < 0.0 => Err(out_of_range(*n, 0.0, f64::MAX)),
                    _ => Ok(()),
                }
            }
            (Capability::ColorTemp(color_temp), EntityValue::Number(n)) => {
                let mireds = match color_temp.unit {
                    Some(ColorTempUnit::Kelvin) if *n > 0.0 => 1_000_000.0 / n,
                    _ => *n,
                };
                match color_temp.range {
                    Some(range) if !range.contains(mireds) => Err(out_of_range(
                        mireds,
                        f64::from(range.min_mireds()),
                        f64::from(range.max_mireds()),
                    )),
                    _ => Ok(()),
                }
            }
            (
                Capability::Numeric(_)
                | Capability::Brightness(_)
                | Capability::ColorTemp(_)
                | Capability::Rgb
                | Capability::OnOff,
                _,
            ) => Err(mismatch()),
        }
    }

    /// Replace the current value after checking it against the capability.
    ///
    /// # Errors
    ///
    /// See [`accepts`](Self::accepts).
    pub fn set_value(&mut self, value: EntityValue, at: Timestamp) -> Result<(), ValidationError> {
        self.accepts(&value)?;
        self.value = Some(value);
        self.updated_at = at;
        Ok(())
    }

    /// Ensure `other` may replace `self` (same capability kind).
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::CapabilityChanged`] when the kinds differ.
    pub fn ensure_same_kind(&self, other: &Self) -> Result<(), ValidationError> {
        if self.kind() == other.kind() {
            Ok(())
        } else {
            Err(ValidationError::CapabilityChanged {
                key: self.key.clone(),
                current: self.kind(),
                requested: other.kind(),
            })
        }
    }
}

/// Step-by-step builder for [`Entity`].
#[derive(Debug, Default)]
pub struct EntityBuilder {
    device_id: Option<DeviceId>,
    key: Option<String>,
    name: Option<String>,
    capability: Option<Capability>,
    value: Option<EntityValue>,
    updated_at: Option<Timestamp>,
}

impl EntityBuilder {
    #[must_use]
    pub fn device_id(mut self, device_id: DeviceId) -> Self {
        self.device_id = Some(device_id);
        self
    }

    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn capability(mut self, capability: Capability) -> Self {
        self.capability = Some(capability);
        self
    }

    #[must_use]
    pub fn value(mut self, value: EntityValue) -> Self {
        self.value = Some(value);
        self
    }

    #[must_use]
    pub fn updated_at(mut self, updated_at: Timestamp) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    /// Consume the builder, validate, and return an [`Entity`].
    ///
    /// The name defaults to the key; the capability defaults to an unbounded
    /// numeric.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] when the device id or key is missing,
    /// or the value does not fit the capability.
    pub fn build(self) -> Result<Entity, HubError> {
        let device_id = self.device_id.ok_or(ValidationError::EmptyDeviceId)?;
        let key = self.key.unwrap_or_default();
        let entity = Entity {
            device_id,
            name: self.name.unwrap_or_else(|| key.clone()),
            key,
            capability: self.capability.unwrap_or_else(|| Capability::numeric(None)),
            value: self.value,
            updated_at: self.updated_at.unwrap_or_else(crate::time::now),
        };
        entity.validate()?;
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_id() -> DeviceId {
        DeviceId::new("dev-1").unwrap()
    }

    fn entity(capability: Capability) -> Entity {
        Entity::builder()
            .device_id(device_id())
            .key("facet")
            .capability(capability)
            .build()
            .unwrap()
    }

    #[test]
    fn should_default_name_to_key() {
        let e = entity(Capability::OnOff);
        assert_eq!(e.name, "facet");
    }

    #[test]
    fn should_reject_empty_key() {
        let result = Entity::builder()
            .device_id(device_id())
            .capability(Capability::OnOff)
            .build();
        assert!(matches!(
            result,
            Err(HubError::Validation(ValidationError::EmptyEntityKey))
        ));
    }

    #[test]
    fn should_reject_missing_device_id() {
        let result = Entity::builder().key("power").build();
        assert!(matches!(
            result,
            Err(HubError::Validation(ValidationError::EmptyDeviceId))
        ));
    }

    #[test]
    fn should_accept_bool_for_on_off() {
        let e = entity(Capability::OnOff);
        assert!(e.accepts(&EntityValue::Bool(true)).is_ok());
        assert!(matches!(
            e.accepts(&EntityValue::Number(1.0)),
            Err(ValidationError::ValueMismatch { .. })
        ));
    }

    #[test]
    fn should_reject_numeric_value_outside_bounds() {
        let e = entity(Capability::numeric_bounded(None, 0.0, 100.0, 1.0).unwrap());
        assert!(e.accepts(&EntityValue::Number(50.0)).is_ok());
        assert!(matches!(
            e.accepts(&EntityValue::Number(101.0)),
            Err(ValidationError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn should_convert_kelvin_to_mireds_when_checking_color_temp() {
        let capability = Capability::ColorTemp(ColorTempCapability {
            unit: Some(ColorTempUnit::Kelvin),
            range: Some(MiredRange::new(153, 500).unwrap()),
        });
        let e = entity(capability);
        // 4000 K = 250 mireds
        assert!(e.accepts(&EntityValue::Number(4000.0)).is_ok());
        // 10000 K = 100 mireds
        assert!(e.accepts(&EntityValue::Number(10_000.0)).is_err());
    }

    #[test]
    fn should_accept_rgb_only_for_rgb_capability() {
        let rgb = EntityValue::Rgb(Rgb { r: 1, g: 2, b: 3 });
        assert!(entity(Capability::Rgb).accepts(&rgb).is_ok());
        assert!(entity(Capability::brightness_percent()).accepts(&rgb).is_err());
    }

    #[test]
    fn should_keep_previous_value_when_set_value_fails() {
        let mut e = entity(Capability::brightness_percent());
        e.set_value(EntityValue::Number(40.0), crate::time::now())
            .unwrap();
        assert!(e
            .set_value(EntityValue::Number(140.0), crate::time::now())
            .is_err());
        assert_eq!(e.value, Some(EntityValue::Number(40.0)));
    }

    #[test]
    fn should_refuse_capability_kind_change() {
        let current = entity(Capability::OnOff);
        let next = entity(Capability::brightness_percent());
        assert!(matches!(
            current.ensure_same_kind(&next),
            Err(ValidationError::CapabilityChanged { .. })
        ));
    }

    #[test]
    fn should_roundtrip_entity_through_serde_json() {
        let e = entity(Capability::numeric_bounded(Some("W"), 0.0, 3600.0, 0.5).unwrap());
        let json = serde_json::to_string(&e).unwrap();
        let parsed: Entity = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, e);
    }
}
