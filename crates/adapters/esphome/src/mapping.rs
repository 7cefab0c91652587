//! Component → entity mapping.
//!
//! | Component | Entities |
//! |-----------|----------|
//! | `switch`, `binary_sensor`, `fan` | `on_off` |
//! | `sensor` | `numeric` (unit, accuracy → precision) |
//! | `number` | `numeric` with min/max/step |
//! | `light` | `on_off`, plus `brightness`, `color_temp`, `rgb` per color mode |

use homehub_domain::entity::{
    Capability, ColorTempCapability, ColorTempUnit, Entity, NumericCapability, NumericRange,
};
use homehub_domain::error::ValidationError;
use homehub_domain::id::DeviceId;

use crate::transport::{ColorMode, Component, ComponentKind};

struct Facet {
    key: String,
    name: String,
    capability: Capability,
}

fn facets(component: &Component) -> Result<Vec<Facet>, ValidationError> {
    let base = |capability| Facet {
        key: component.object_id.clone(),
        name: component.name.clone(),
        capability,
    };
    let derived = |suffix: &str, label: &str, capability| Facet {
        key: format!("{}_{suffix}", component.object_id),
        name: format!("{} {label}", component.name),
        capability,
    };

    let facets = match &component.kind {
        ComponentKind::Switch | ComponentKind::BinarySensor | ComponentKind::Fan => {
            vec![base(Capability::OnOff)]
        }
        ComponentKind::Sensor {
            unit,
            accuracy_decimals,
        } => vec![base(Capability::Numeric(NumericCapability {
            unit: unit.clone(),
            range: None,
            precision: *accuracy_decimals,
        }))],
        ComponentKind::Number {
            unit,
            min,
            max,
            step,
        } => vec![base(Capability::Numeric(NumericCapability {
            unit: unit.clone(),
            range: Some(NumericRange::new(*min, *max, *step)?),
            precision: None,
        }))],
        ComponentKind::Light {
            color_modes,
            min_mireds,
            max_mireds,
        } => {
            let mut facets = vec![base(Capability::OnOff)];
            if color_modes.iter().any(|mode| *mode != ColorMode::OnOff) {
                facets.push(derived(
                    "brightness",
                    "brightness",
                    Capability::brightness_percent(),
                ));
            }
            if color_modes.contains(&ColorMode::ColorTemperature) {
                let capability = match (min_mireds, max_mireds) {
                    (Some(min), Some(max)) => Capability::color_temp_mireds(*min, *max)?,
                    _ => Capability::ColorTemp(ColorTempCapability {
                        unit: Some(ColorTempUnit::Mireds),
                        range: None,
                    }),
                };
                facets.push(derived("color_temp", "color temperature", capability));
            }
            if color_modes.contains(&ColorMode::Rgb) {
                facets.push(derived("rgb", "color", Capability::Rgb));
            }
            facets
        }
    };
    Ok(facets)
}

/// Build the entities of `device_id` from its component list.
///
/// Components with inconsistent bounds are skipped with a warning so one bad
/// component does not fail the whole pairing.
#[must_use]
pub fn entities(device_id: &DeviceId, components: &[Component]) -> Vec<Entity> {
    let mut entities = Vec::new();
    for component in components {
        let facets = match facets(component) {
            Ok(facets) => facets,
            Err(err) => {
                tracing::warn!(
                    device_id = %device_id,
                    object_id = %component.object_id,
                    error = %err,
                    "skipping esphome component"
                );
                continue;
            }
        };
        for facet in facets {
            match Entity::builder()
                .device_id(device_id.clone())
                .key(facet.key)
                .name(facet.name)
                .capability(facet.capability)
                .build()
            {
                Ok(entity) => entities.push(entity),
                Err(err) => tracing::warn!(
                    device_id = %device_id,
                    object_id = %component.object_id,
                    error = %err,
                    "skipping esphome entity"
                ),
            }
        }
    }
    entities
}

#[cfg(test)]
mod tests {
    use homehub_domain::entity::CapabilityKind;

    use super::*;

    fn component(object_id: &str, kind: ComponentKind) -> Component {
        Component {
            object_id: object_id.to_string(),
            name: object_id.replace('_', " "),
            kind,
        }
    }

    fn device_id() -> DeviceId {
        DeviceId::new("node-1").unwrap()
    }

    fn kinds(entities: &[Entity]) -> Vec<(&str, CapabilityKind)> {
        entities.iter().map(|e| (e.key.as_str(), e.kind())).collect()
    }

    #[test]
    fn should_map_binary_components_to_on_off() {
        let entities = entities(
            &device_id(),
            &[
                component("relay", ComponentKind::Switch),
                component("motion", ComponentKind::BinarySensor),
                component("fan", ComponentKind::Fan),
            ],
        );
        assert_eq!(
            kinds(&entities),
            vec![
                ("relay", CapabilityKind::OnOff),
                ("motion", CapabilityKind::OnOff),
                ("fan", CapabilityKind::OnOff),
            ]
        );
    }

    #[test]
    fn should_carry_sensor_unit_and_precision() {
        let entities = entities(
            &device_id(),
            &[component(
                "temperature",
                ComponentKind::Sensor {
                    unit: Some("°C".to_string()),
                    accuracy_decimals: Some(1),
                },
            )],
        );
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].unit(), Some("°C"));
        assert!(matches!(
            entities[0].capability(),
            Capability::Numeric(NumericCapability {
                precision: Some(1),
                range: None,
                ..
            })
        ));
    }

    #[test]
    fn should_expand_light_per_color_mode() {
        let entities = entities(
            &device_id(),
            &[component(
                "ceiling",
                ComponentKind::Light {
                    color_modes: vec![ColorMode::ColorTemperature, ColorMode::Rgb],
                    min_mireds: Some(153),
                    max_mireds: Some(500),
                },
            )],
        );
        assert_eq!(
            kinds(&entities),
            vec![
                ("ceiling", CapabilityKind::OnOff),
                ("ceiling_brightness", CapabilityKind::Brightness),
                ("ceiling_color_temp", CapabilityKind::ColorTemp),
                ("ceiling_rgb", CapabilityKind::Rgb),
            ]
        );
    }

    #[test]
    fn should_map_on_off_only_light_to_single_entity() {
        let entities = entities(
            &device_id(),
            &[component(
                "porch",
                ComponentKind::Light {
                    color_modes: vec![ColorMode::OnOff],
                    min_mireds: None,
                    max_mireds: None,
                },
            )],
        );
        assert_eq!(kinds(&entities), vec![("porch", CapabilityKind::OnOff)]);
    }

    #[test]
    fn should_skip_number_with_inverted_bounds() {
        let entities = entities(
            &device_id(),
            &[
                component(
                    "broken",
                    ComponentKind::Number {
                        unit: None,
                        min: 10.0,
                        max: 0.0,
                        step: 1.0,
                    },
                ),
                component("relay", ComponentKind::Switch),
            ],
        );
        assert_eq!(kinds(&entities), vec![("relay", CapabilityKind::OnOff)]);
    }
}
