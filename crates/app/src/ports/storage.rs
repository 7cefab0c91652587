//! Storage port — local persistence for devices and entities.

use std::future::Future;
use std::path::PathBuf;

use homehub_domain::device::Device;
use homehub_domain::entity::Entity;
use homehub_domain::error::HubError;

/// Where and how to open the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Database file. `:memory:` opens a private in-memory database.
    pub path: PathBuf,
    /// Apply embedded migrations before checking the schema version.
    pub run_migrations: bool,
}

impl StorageConfig {
    pub const IN_MEMORY: &'static str = ":memory:";

    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            run_migrations: true,
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Self::IN_MEMORY)
    }

    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == Self::IN_MEMORY
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new("data/homehub.db")
    }
}

/// Backing store of the device registry.
///
/// Implementations must make every `save_*` call atomic: either the whole
/// write lands or nothing does.
pub trait DeviceStore: Send + Sync + Sized + 'static {
    /// Open (and if configured, migrate) the store.
    ///
    /// Fails with [`HubError::Storage`] when the location is unusable and with
    /// [`HubError::SchemaMismatch`] when the schema is not the expected one.
    fn open(config: &StorageConfig) -> impl Future<Output = Result<Self, HubError>> + Send;

    /// Every device, removed ones included.
    fn load_devices(&self) -> impl Future<Output = Result<Vec<Device>, HubError>> + Send;

    /// Every entity.
    fn load_entities(&self) -> impl Future<Output = Result<Vec<Entity>, HubError>> + Send;

    /// Insert or replace a device.
    fn save_device(&self, device: &Device) -> impl Future<Output = Result<(), HubError>> + Send;

    /// Insert or replace a device and its entities in one transaction.
    fn save_device_with_entities(
        &self,
        device: &Device,
        entities: &[Entity],
    ) -> impl Future<Output = Result<(), HubError>> + Send;

    /// Insert or replace one entity.
    fn save_entity(&self, entity: &Entity) -> impl Future<Output = Result<(), HubError>> + Send;

    /// Flush pending writes and release the store.
    fn close(&self) -> impl Future<Output = Result<(), HubError>> + Send;
}
