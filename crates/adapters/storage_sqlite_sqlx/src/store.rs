//! [`DeviceStore`] backed by a single `SQLite` file.

use std::future::Future;

use homehub_app::ports::{DeviceStore, StorageConfig};
use homehub_domain::device::Device;
use homehub_domain::entity::Entity;
use homehub_domain::error::HubError;

use crate::error::StorageError;
use crate::pool::Database;
use crate::{device_repo, entity_repo};

/// `SQLite`-backed device store.
pub struct SqliteDeviceStore {
    database: Database,
}

impl SqliteDeviceStore {
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.database
    }
}

impl DeviceStore for SqliteDeviceStore {
    fn open(config: &StorageConfig) -> impl Future<Output = Result<Self, HubError>> + Send {
        let config = config.clone();
        async move {
            let database = Database::open(&config).await?;
            Ok(Self { database })
        }
    }

    fn load_devices(&self) -> impl Future<Output = Result<Vec<Device>, HubError>> + Send {
        async move { Ok(device_repo::find_all(self.database.pool()).await?) }
    }

    fn load_entities(&self) -> impl Future<Output = Result<Vec<Entity>, HubError>> + Send {
        async move { Ok(entity_repo::find_all(self.database.pool()).await?) }
    }

    fn save_device(&self, device: &Device) -> impl Future<Output = Result<(), HubError>> + Send {
        async move { Ok(device_repo::upsert(self.database.pool(), device).await?) }
    }

    fn save_device_with_entities(
        &self,
        device: &Device,
        entities: &[Entity],
    ) -> impl Future<Output = Result<(), HubError>> + Send {
        async move {
            let mut tx = self
                .database
                .pool()
                .begin()
                .await
                .map_err(StorageError::from)?;
            device_repo::upsert(&mut *tx, device).await?;
            for entity in entities {
                entity_repo::upsert(&mut *tx, entity).await?;
            }
            tx.commit().await.map_err(StorageError::from)?;
            tracing::debug!(
                device_id = %device.id,
                entities = entities.len(),
                "device saved with entities"
            );
            Ok(())
        }
    }

    fn save_entity(&self, entity: &Entity) -> impl Future<Output = Result<(), HubError>> + Send {
        async move { Ok(entity_repo::upsert(self.database.pool(), entity).await?) }
    }

    fn close(&self) -> impl Future<Output = Result<(), HubError>> + Send {
        async move {
            self.database.close().await;
            Ok(())
        }
    }
}
