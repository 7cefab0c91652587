//! # homehub-adapter-esphome
//!
//! ESPHome adapter — pairs and connects ESPHome nodes over their native API
//! and exposes their components as homehub entities.
//!
//! ## How it works
//!
//! ESPHome has no commissioning handshake: "pairing" validates the key
//! material, opens a session once to read the node description and its
//! component list, and returns normalised connection credentials for the
//! registry to persist. Later sessions reuse those credentials.
//!
//! Nodes configured without `api: encryption:` are accepted in plaintext
//! mode unless [`EsphomeConfig::require_encryption`] is set.
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `homehub-app` and `homehub-domain`.

mod config;
mod driver;
mod error;
pub mod mapping;
pub mod params;
pub mod transport;

pub use config::EsphomeConfig;
pub use driver::EsphomeDriver;
pub use error::EsphomeError;
pub use transport::{EsphomeTransport, TcpTransport};

use std::sync::Arc;

use homehub_app::ports::{DriverContext, DriverFactory, ProtocolDriver};
use homehub_domain::error::DriverError;
use homehub_domain::protocol::ProtocolTag;

/// Builds an [`EsphomeDriver`] per device, sharing one transport.
pub struct EsphomeFactory {
    config: EsphomeConfig,
    transport: Arc<dyn EsphomeTransport>,
}

impl EsphomeFactory {
    /// Factory using the reachability-only [`TcpTransport`].
    #[must_use]
    pub fn new(config: EsphomeConfig) -> Self {
        Self {
            config,
            transport: Arc::new(TcpTransport),
        }
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn EsphomeTransport>) -> Self {
        self.transport = transport;
        self
    }
}

impl DriverFactory for EsphomeFactory {
    fn protocol(&self) -> ProtocolTag {
        ProtocolTag::from_static(ProtocolTag::ESPHOME)
    }

    fn create(&self, context: DriverContext) -> Result<Arc<dyn ProtocolDriver>, DriverError> {
        Ok(Arc::new(EsphomeDriver::new(
            context,
            self.config.clone(),
            Arc::clone(&self.transport),
        )))
    }
}
