//! ESPHome driver configuration.

use serde::Deserialize;

/// Defaults applied to every ESPHome device.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EsphomeConfig {
    /// Native API port used when a device has no `port` credential.
    pub port: u16,
    /// Refuse to pair or connect devices without an `encryption_key`.
    pub require_encryption: bool,
}

impl Default for EsphomeConfig {
    fn default() -> Self {
        Self {
            port: 6053,
            require_encryption: false,
        }
    }
}
