//! # homehub-adapter-virtual
//!
//! Simulated `virtual` protocol for demos and end-to-end tests.
//!
//! ## Provided devices
//!
//! Every paired virtual device reports the same hardware:
//!
//! | Entity key | Capability | Initial value |
//! |------------|------------|---------------|
//! | `light` | `on_off` | off |
//! | `light_brightness` | `brightness` (%) | 100 |
//! | `light_color_temp` | `color_temp` (153-500 mireds) | 370 |
//! | `light_color` | `rgb` | warm white |
//! | `temperature` | `numeric` (°C) | 21.5 |
//!
//! Behaviour is steered through credentials, see [`behaviour`].
//!
//! ## Dependency rule
//!
//! Depends on `homehub-app` (port traits) and `homehub-domain` only.

pub mod behaviour;
pub mod devices;
mod driver;

pub use driver::VirtualDriver;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use homehub_app::ports::{DriverContext, DriverFactory, ProtocolDriver};
use homehub_domain::error::DriverError;
use homehub_domain::id::DeviceId;
use homehub_domain::protocol::ProtocolTag;

/// Builds [`VirtualDriver`]s and keeps a handle on the latest one per device,
/// so tests can simulate link loss.
#[derive(Default)]
pub struct VirtualFactory {
    drivers: Mutex<HashMap<DeviceId, Weak<VirtualDriver>>>,
}

impl VirtualFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn drivers(&self) -> MutexGuard<'_, HashMap<DeviceId, Weak<VirtualDriver>>> {
        self.drivers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The most recent live driver built for `device_id`.
    #[must_use]
    pub fn driver(&self, device_id: &DeviceId) -> Option<Arc<VirtualDriver>> {
        self.drivers().get(device_id).and_then(Weak::upgrade)
    }
}

impl DriverFactory for VirtualFactory {
    fn protocol(&self) -> ProtocolTag {
        ProtocolTag::from_static(ProtocolTag::VIRTUAL)
    }

    fn create(&self, context: DriverContext) -> Result<Arc<dyn ProtocolDriver>, DriverError> {
        let driver = Arc::new(VirtualDriver::new(context));
        let mut drivers = self.drivers();
        drivers.retain(|_, driver| driver.strong_count() > 0);
        drivers.insert(driver.device_id().clone(), Arc::downgrade(&driver));
        Ok(driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_serve_virtual_protocol() {
        assert_eq!(VirtualFactory::new().protocol(), "virtual");
    }

    #[tokio::test]
    async fn should_expose_live_driver_for_link_loss() {
        let factory = VirtualFactory::new();
        let id = DeviceId::new("v-1").unwrap();
        let session = factory.create(DriverContext::new(id.clone(), None)).unwrap();
        session.connect().await.unwrap();

        factory.driver(&id).unwrap().drop_session();

        assert!(!session.is_connected());
    }

    #[test]
    fn should_forget_dropped_drivers() {
        let factory = VirtualFactory::new();
        let id = DeviceId::new("v-1").unwrap();
        drop(factory.create(DriverContext::new(id.clone(), None)).unwrap());

        assert!(factory.driver(&id).is_none());
    }
}
