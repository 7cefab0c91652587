//! Capability descriptors — the closed set of things an entity can represent.
//!
//! New device semantics extend [`Capability`]; they are never smuggled in as
//! free-form attributes. Bound groups are all-or-nothing and are validated on
//! construction and on deserialization alike.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// The `type` tag of a [`Capability`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Numeric,
    Brightness,
    ColorTemp,
    Rgb,
    OnOff,
}

impl CapabilityKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Brightness => "brightness",
            Self::ColorTemp => "color_temp",
            Self::Rgb => "rgb",
            Self::OnOff => "on_off",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of a brightness scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrightnessUnit {
    #[serde(rename = "%")]
    Percent,
    #[serde(rename = "lm")]
    Lumen,
}

impl BrightnessUnit {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Percent => "%",
            Self::Lumen => "lm",
        }
    }
}

/// Unit of a white-point scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorTempUnit {
    #[serde(rename = "mireds")]
    Mireds,
    #[serde(rename = "K")]
    Kelvin,
}

impl ColorTempUnit {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Mireds => "mireds",
            Self::Kelvin => "K",
        }
    }
}

/// Inclusive `min..=max` range stepped by `step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericRange {
    min: f64,
    max: f64,
    step: f64,
}

impl NumericRange {
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidBounds`] when the values are not
    /// finite, `min > max`, or `step <= 0`.
    pub fn new(min: f64, max: f64, step: f64) -> Result<Self, ValidationError> {
        let kind = CapabilityKind::Numeric;
        if !(min.is_finite() && max.is_finite() && step.is_finite()) {
            return Err(ValidationError::InvalidBounds {
                kind,
                reason: "bounds must be finite",
            });
        }
        if min > max {
            return Err(ValidationError::InvalidBounds {
                kind,
                reason: "min must not exceed max",
            });
        }
        if step <= 0.0 {
            return Err(ValidationError::InvalidBounds {
                kind,
                reason: "step must be positive",
            });
        }
        Ok(Self { min, max, step })
    }

    #[must_use]
    pub fn min(&self) -> f64 {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> f64 {
        self.max
    }

    #[must_use]
    pub fn step(&self) -> f64 {
        self.step
    }

    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Inclusive `min..=max` range without a step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    min: f64,
    max: f64,
}

impl Range {
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidBounds`] when the values are not
    /// finite or `min > max`.
    pub fn new(kind: CapabilityKind, min: f64, max: f64) -> Result<Self, ValidationError> {
        if !(min.is_finite() && max.is_finite()) {
            return Err(ValidationError::InvalidBounds {
                kind,
                reason: "bounds must be finite",
            });
        }
        if min > max {
            return Err(ValidationError::InvalidBounds {
                kind,
                reason: "min must not exceed max",
            });
        }
        Ok(Self { min, max })
    }

    #[must_use]
    pub fn min(&self) -> f64 {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> f64 {
        self.max
    }

    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Inclusive white-point range in mireds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiredRange {
    min_mireds: u16,
    max_mireds: u16,
}

impl MiredRange {
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidBounds`] when `min_mireds` is zero
    /// or exceeds `max_mireds`.
    pub fn new(min_mireds: u16, max_mireds: u16) -> Result<Self, ValidationError> {
        let kind = CapabilityKind::ColorTemp;
        if min_mireds == 0 {
            return Err(ValidationError::InvalidBounds {
                kind,
                reason: "min_mireds must be positive",
            });
        }
        if min_mireds > max_mireds {
            return Err(ValidationError::InvalidBounds {
                kind,
                reason: "min_mireds must not exceed max_mireds",
            });
        }
        Ok(Self {
            min_mireds,
            max_mireds,
        })
    }

    #[must_use]
    pub fn min_mireds(&self) -> u16 {
        self.min_mireds
    }

    #[must_use]
    pub fn max_mireds(&self) -> u16 {
        self.max_mireds
    }

    #[must_use]
    pub fn contains(&self, mireds: f64) -> bool {
        (f64::from(self.min_mireds)..=f64::from(self.max_mireds)).contains(&mireds)
    }
}

/// Generic scalar sensor or control.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumericCapability {
    pub unit: Option<String>,
    pub range: Option<NumericRange>,
    pub precision: Option<u8>,
}

/// Light intensity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrightnessCapability {
    pub unit: Option<BrightnessUnit>,
    pub range: Option<Range>,
}

/// White-point control.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorTempCapability {
    pub unit: Option<ColorTempUnit>,
    pub range: Option<MiredRange>,
}

/// What an entity can represent or control.
///
/// Serialized with an internal `type` tag:
///
/// ```json
/// {"type": "numeric", "unit": "°C", "min": 0.0, "max": 100.0, "step": 1.0}
/// {"type": "on_off"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCapability", into = "RawCapability")]
pub enum Capability {
    Numeric(NumericCapability),
    Brightness(BrightnessCapability),
    ColorTemp(ColorTempCapability),
    Rgb,
    OnOff,
}

impl Capability {
    #[must_use]
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Self::Numeric(_) => CapabilityKind::Numeric,
            Self::Brightness(_) => CapabilityKind::Brightness,
            Self::ColorTemp(_) => CapabilityKind::ColorTemp,
            Self::Rgb => CapabilityKind::Rgb,
            Self::OnOff => CapabilityKind::OnOff,
        }
    }

    /// Display unit, if the capability carries one.
    #[must_use]
    pub fn unit(&self) -> Option<&str> {
        match self {
            Self::Numeric(c) => c.unit.as_deref(),
            Self::Brightness(c) => c.unit.map(BrightnessUnit::symbol),
            Self::ColorTemp(c) => c.unit.map(ColorTempUnit::symbol),
            Self::Rgb | Self::OnOff => None,
        }
    }

    /// Unbounded numeric capability with an optional unit.
    #[must_use]
    pub fn numeric(unit: Option<&str>) -> Self {
        Self::Numeric(NumericCapability {
            unit: unit.map(str::to_string),
            ..NumericCapability::default()
        })
    }

    /// Bounded numeric capability.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidBounds`] for inconsistent bounds.
    pub fn numeric_bounded(
        unit: Option<&str>,
        min: f64,
        max: f64,
        step: f64,
    ) -> Result<Self, ValidationError> {
        Ok(Self::Numeric(NumericCapability {
            unit: unit.map(str::to_string),
            range: Some(NumericRange::new(min, max, step)?),
            precision: None,
        }))
    }

    /// Brightness on a `0..=100 %` scale.
    #[must_use]
    pub fn brightness_percent() -> Self {
        Self::Brightness(BrightnessCapability {
            unit: Some(BrightnessUnit::Percent),
            range: Some(Range {
                min: 0.0,
                max: 100.0,
            }),
        })
    }

    /// Color temperature bounded in mireds.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidBounds`] for inconsistent bounds.
    pub fn color_temp_mireds(min_mireds: u16, max_mireds: u16) -> Result<Self, ValidationError> {
        Ok(Self::ColorTemp(ColorTempCapability {
            unit: Some(ColorTempUnit::Mireds),
            range: Some(MiredRange::new(min_mireds, max_mireds)?),
        }))
    }
}

/// Flat wire shape; every optional field may be absent.
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawCapability {
    Numeric {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        precision: Option<u8>,
    },
    Brightness {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<BrightnessUnit>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    ColorTemp {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<ColorTempUnit>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_mireds: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_mireds: Option<u16>,
    },
    Rgb,
    OnOff,
}

impl TryFrom<RawCapability> for Capability {
    type Error = ValidationError;

    fn try_from(raw: RawCapability) -> Result<Self, Self::Error> {
        match raw {
            RawCapability::Numeric {
                unit,
                min,
                max,
                step,
                precision,
            } => {
                let range = match (min, max, step) {
                    (Some(min), Some(max), Some(step)) => Some(NumericRange::new(min, max, step)?),
                    (None, None, None) => None,
                    _ => {
                        return Err(ValidationError::PartialBounds {
                            kind: CapabilityKind::Numeric,
                            fields: "min, max and step",
                        });
                    }
                };
                Ok(Self::Numeric(NumericCapability {
                    unit,
                    range,
                    precision,
                }))
            }
            RawCapability::Brightness { unit, min, max } => {
                let range = match (min, max) {
                    (Some(min), Some(max)) => {
                        Some(Range::new(CapabilityKind::Brightness, min, max)?)
                    }
                    (None, None) => None,
                    _ => {
                        return Err(ValidationError::PartialBounds {
                            kind: CapabilityKind::Brightness,
                            fields: "min and max",
                        });
                    }
                };
                Ok(Self::Brightness(BrightnessCapability { unit, range }))
            }
            RawCapability::ColorTemp {
                unit,
                min_mireds,
                max_mireds,
            } => {
                let range = match (min_mireds, max_mireds) {
                    (Some(min), Some(max)) => Some(MiredRange::new(min, max)?),
                    (None, None) => None,
                    _ => {
                        return Err(ValidationError::PartialBounds {
                            kind: CapabilityKind::ColorTemp,
                            fields: "min_mireds and max_mireds",
                        });
                    }
                };
                Ok(Self::ColorTemp(ColorTempCapability { unit, range }))
            }
            RawCapability::Rgb => Ok(Self::Rgb),
            RawCapability::OnOff => Ok(Self::OnOff),
        }
    }
}

impl From<Capability> for RawCapability {
    fn from(capability: Capability) -> Self {
        match capability {
            Capability::Numeric(c) => Self::Numeric {
                unit: c.unit,
                min: c.range.map(|r| r.min),
                max: c.range.map(|r| r.max),
                step: c.range.map(|r| r.step),
                precision: c.precision,
            },
            Capability::Brightness(c) => Self::Brightness {
                unit: c.unit,
                min: c.range.map(|r| r.min),
                max: c.range.map(|r| r.max),
            },
            Capability::ColorTemp(c) => Self::ColorTemp {
                unit: c.unit,
                min_mireds: c.range.map(|r| r.min_mireds),
                max_mireds: c.range.map(|r| r.max_mireds),
            },
            Capability::Rgb => Self::Rgb,
            Capability::OnOff => Self::OnOff,
        }
    }
}
