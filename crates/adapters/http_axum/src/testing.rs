//! Shared fixtures for handler tests: a no-op store and a scripted driver.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;

use homehub_app::daemon::{DaemonConfig, HubDaemon};
use homehub_app::driver_manager::DriverTimeouts;
use homehub_app::driver_registry::DriverRegistry;
use homehub_app::ports::{
    DeviceStore, DriverContext, DriverFactory, ProtocolDriver, StorageConfig,
};
use homehub_domain::credentials::Credentials;
use homehub_domain::device::Device;
use homehub_domain::entity::{Capability, Entity};
use homehub_domain::error::{DriverError, HubError};
use homehub_domain::id::DeviceId;
use homehub_domain::pairing::PairingReport;
use homehub_domain::protocol::ProtocolTag;

use crate::state::AppState;

/// Store that accepts every write and loads nothing; the registry keeps the
/// state in memory.
pub struct StubStore;

impl DeviceStore for StubStore {
    async fn open(_config: &StorageConfig) -> Result<Self, HubError> {
        Ok(Self)
    }
    async fn load_devices(&self) -> Result<Vec<Device>, HubError> {
        Ok(vec![])
    }
    async fn load_entities(&self) -> Result<Vec<Entity>, HubError> {
        Ok(vec![])
    }
    async fn save_device(&self, _device: &Device) -> Result<(), HubError> {
        Ok(())
    }
    async fn save_device_with_entities(
        &self,
        _device: &Device,
        _entities: &[Entity],
    ) -> Result<(), HubError> {
        Ok(())
    }
    async fn save_entity(&self, _entity: &Entity) -> Result<(), HubError> {
        Ok(())
    }
    async fn close(&self) -> Result<(), HubError> {
        Ok(())
    }
}

/// Driver for the `stub` protocol. Pairing hangs with a `hang` credential
/// and is refused with a `reject` credential.
struct StubDriver {
    connected: AtomicBool,
}

impl ProtocolDriver for StubDriver {
    fn connect(&self) -> BoxFuture<'_, Result<(), DriverError>> {
        Box::pin(async move {
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<(), DriverError>> {
        Box::pin(async move {
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn pair(
        &self,
        device_id: DeviceId,
        credentials: Option<Credentials>,
    ) -> BoxFuture<'_, Result<PairingReport, DriverError>> {
        Box::pin(async move {
            let flag = |key: &str| {
                credentials
                    .as_ref()
                    .and_then(|c| c.get_non_empty(key))
                    .is_some()
            };
            if flag("hang") {
                futures::future::pending::<()>().await;
            }
            if flag("reject") {
                return Err(DriverError::pairing("device refused"));
            }
            let power = Entity::builder()
                .device_id(device_id)
                .key("power")
                .capability(Capability::OnOff)
                .build()
                .map_err(|err| DriverError::pairing(err.to_string()))?;
            Ok(PairingReport {
                entities: vec![power],
                ..PairingReport::default()
            })
        })
    }
}

struct StubFactory;

impl DriverFactory for StubFactory {
    fn protocol(&self) -> ProtocolTag {
        ProtocolTag::from_static("stub")
    }

    fn create(&self, _context: DriverContext) -> Result<Arc<dyn ProtocolDriver>, DriverError> {
        Ok(Arc::new(StubDriver {
            connected: AtomicBool::new(false),
        }))
    }
}

pub fn drivers() -> DriverRegistry {
    DriverRegistry::new().with(Arc::new(StubFactory))
}

/// State over an initialized (not started) daemon with short driver
/// timeouts.
pub async fn ready_state() -> AppState<StubStore> {
    let daemon = HubDaemon::new(drivers());
    let limit = Duration::from_millis(100);
    daemon
        .initialize(DaemonConfig {
            storage: StorageConfig::in_memory(),
            timeouts: DriverTimeouts {
                pairing: limit,
                connect: limit,
                disconnect: limit,
            },
            ..DaemonConfig::default()
        })
        .await
        .unwrap();
    AppState::new(Arc::new(daemon))
}
