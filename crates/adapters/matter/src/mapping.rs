//! Cluster → entity mapping. Keys are `ep<endpoint>_<facet>`.

use homehub_domain::entity::{Capability, ColorTempCapability, ColorTempUnit, Entity, NumericCapability};
use homehub_domain::error::HubError;
use homehub_domain::id::DeviceId;

use crate::controller::{Cluster, Endpoint};

fn facets(cluster: &Cluster) -> Result<Vec<(&'static str, &'static str, Capability)>, HubError> {
    let facets = match cluster {
        Cluster::OnOff => vec![("on_off", "on/off", Capability::OnOff)],
        Cluster::LevelControl => vec![("level", "level", Capability::brightness_percent())],
        Cluster::ColorControl {
            color_temperature,
            hue_saturation,
            min_mireds,
            max_mireds,
        } => {
            let mut facets = Vec::new();
            if *color_temperature {
                let capability = match (min_mireds, max_mireds) {
                    (Some(min), Some(max)) => Capability::color_temp_mireds(*min, *max)?,
                    _ => Capability::ColorTemp(ColorTempCapability {
                        unit: Some(ColorTempUnit::Mireds),
                        range: None,
                    }),
                };
                facets.push(("color_temp", "color temperature", capability));
            }
            if *hue_saturation {
                facets.push(("color", "color", Capability::Rgb));
            }
            facets
        }
        Cluster::TemperatureMeasurement => vec![(
            "temperature",
            "temperature",
            Capability::Numeric(NumericCapability {
                unit: Some("°C".to_string()),
                range: None,
                precision: Some(2),
            }),
        )],
        Cluster::RelativeHumidityMeasurement => vec![(
            "humidity",
            "humidity",
            Capability::numeric_bounded(Some("%"), 0.0, 100.0, 0.01)?,
        )],
        Cluster::IlluminanceMeasurement => vec![(
            "illuminance",
            "illuminance",
            Capability::numeric(Some("lx")),
        )],
    };
    Ok(facets)
}

/// Build the entities of `device_id` from its endpoint list, skipping
/// clusters with inconsistent attributes.
#[must_use]
pub fn entities(device_id: &DeviceId, endpoints: &[Endpoint]) -> Vec<Entity> {
    let mut entities = Vec::new();
    for endpoint in endpoints {
        for cluster in &endpoint.clusters {
            let built = facets(cluster).and_then(|facets| {
                facets
                    .into_iter()
                    .map(|(suffix, label, capability)| {
                        Entity::builder()
                            .device_id(device_id.clone())
                            .key(format!("ep{}_{suffix}", endpoint.id))
                            .name(format!("Endpoint {} {label}", endpoint.id))
                            .capability(capability)
                            .build()
                    })
                    .collect::<Result<Vec<_>, _>>()
            });
            match built {
                Ok(mut built) => entities.append(&mut built),
                Err(err) => tracing::warn!(
                    device_id = %device_id,
                    endpoint = endpoint.id,
                    cluster = ?cluster,
                    error = %err,
                    "skipping matter cluster"
                ),
            }
        }
    }
    entities
}
