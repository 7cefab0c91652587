//! # homehub-adapter-matter
//!
//! Matter adapter — validates onboarding payloads and commissions Matter
//! nodes onto the hub's fabric.
//!
//! ## Credentials
//!
//! | Key | When | Meaning |
//! |-----|------|---------|
//! | `setup_code` | pairing | 11/21-digit manual code or `MT:` QR payload |
//! | `node_id` | after pairing | operational node id on the hub's fabric |
//!
//! The fabric work itself is done by a [`MatterController`]. Builds without
//! one use [`UnavailableController`], which fails pairing with a clear
//! reason.
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `homehub-app` and `homehub-domain`.

pub mod controller;
mod driver;
pub mod mapping;
pub mod setup_code;

pub use controller::{CommissionError, MatterController, UnavailableController};
pub use driver::{MatterDriver, NODE_ID, SETUP_CODE};
pub use setup_code::{ManualCode, SetupCode, SetupCodeError};

use std::sync::Arc;

use homehub_app::ports::{DriverContext, DriverFactory, ProtocolDriver};
use homehub_domain::error::DriverError;
use homehub_domain::protocol::ProtocolTag;

/// Builds a [`MatterDriver`] per device, sharing one controller.
pub struct MatterFactory {
    controller: Arc<dyn MatterController>,
}

impl MatterFactory {
    #[must_use]
    pub fn new(controller: Arc<dyn MatterController>) -> Self {
        Self { controller }
    }
}

impl Default for MatterFactory {
    fn default() -> Self {
        Self::new(Arc::new(UnavailableController))
    }
}

impl DriverFactory for MatterFactory {
    fn protocol(&self) -> ProtocolTag {
        ProtocolTag::from_static(ProtocolTag::MATTER)
    }

    fn create(&self, context: DriverContext) -> Result<Arc<dyn ProtocolDriver>, DriverError> {
        Ok(Arc::new(MatterDriver::new(
            context,
            Arc::clone(&self.controller),
        )))
    }
}
