//! Device registry — the single owner of device and entity state.
//!
//! Every mutation is written through to the [`DeviceStore`] before the
//! in-memory copy is replaced, so a failed write leaves the registry
//! unchanged. Operations on one device id are serialized by a per-device
//! mutex (FIFO, so they apply in the order they were issued); different ids
//! never wait on each other.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::Mutex;

use homehub_domain::device::{Device, DeviceStatus, DeviceUpdate};
use homehub_domain::entity::Entity;
use homehub_domain::error::{HubError, ValidationError};
use homehub_domain::id::DeviceId;
use homehub_domain::protocol::ProtocolTag;
use homehub_domain::status::ProtocolSummary;
use homehub_domain::time::{Timestamp, now};

use crate::ports::DeviceStore;

#[derive(Debug, Clone)]
struct Record {
    device: Device,
    entities: BTreeMap<String, Entity>,
}

/// `None` until the first successful write for the id.
type Slot = Arc<Mutex<Option<Record>>>;

/// Criteria for [`DeviceRegistry::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    pub protocol: Option<ProtocolTag>,
    pub status: Option<DeviceStatus>,
    /// Include soft-deleted devices. Filtering on `status = removed` implies it.
    pub include_removed: bool,
}

impl DeviceFilter {
    #[must_use]
    pub fn protocol(mut self, protocol: ProtocolTag) -> Self {
        self.protocol = Some(protocol);
        self
    }

    #[must_use]
    pub fn status(mut self, status: DeviceStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn include_removed(mut self) -> Self {
        self.include_removed = true;
        self
    }

    #[must_use]
    pub fn matches(&self, device: &Device) -> bool {
        if device.status == DeviceStatus::Removed
            && !self.include_removed
            && self.status != Some(DeviceStatus::Removed)
        {
            return false;
        }
        self.protocol.as_ref().is_none_or(|p| *p == device.protocol)
            && self.status.is_none_or(|s| s == device.status)
    }
}

/// Registry of every device the hub knows about.
pub struct DeviceRegistry<S> {
    store: S,
    slots: RwLock<HashMap<DeviceId, Slot>>,
}

impl<S: DeviceStore> DeviceRegistry<S> {
    /// Create an empty registry backed by `store`.
    pub fn new(store: S) -> Self {
        Self {
            store,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn read_slots(&self) -> RwLockReadGuard<'_, HashMap<DeviceId, Slot>> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_slots(&self) -> RwLockWriteGuard<'_, HashMap<DeviceId, Slot>> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, id: &DeviceId) -> Option<Slot> {
        self.read_slots().get(id).cloned()
    }

    fn slot_or_insert(&self, id: &DeviceId) -> Slot {
        if let Some(slot) = self.slot(id) {
            return slot;
        }
        Arc::clone(self.write_slots().entry(id.clone()).or_default())
    }

    fn all_slots(&self) -> Vec<Slot> {
        self.read_slots().values().cloned().collect()
    }

    /// Replace the in-memory state with the store's content.
    ///
    /// # Errors
    ///
    /// Propagates [`HubError::Storage`] from the store.
    #[tracing::instrument(skip(self))]
    pub async fn load(&self) -> Result<usize, HubError> {
        let devices = self.store.load_devices().await?;
        let entities = self.store.load_entities().await?;

        let mut records: HashMap<DeviceId, Record> = devices
            .into_iter()
            .map(|device| {
                let record = Record {
                    device,
                    entities: BTreeMap::new(),
                };
                (record.device.id.clone(), record)
            })
            .collect();
        for entity in entities {
            match records.get_mut(&entity.device_id) {
                Some(record) => {
                    record.entities.insert(entity.key.clone(), entity);
                }
                None => tracing::warn!(
                    device_id = %entity.device_id,
                    key = %entity.key,
                    "skipping entity of unknown device"
                ),
            }
        }

        let count = records.len();
        let mut slots = self.write_slots();
        slots.clear();
        slots.extend(
            records
                .into_iter()
                .map(|(id, record)| (id, Arc::new(Mutex::new(Some(record))))),
        );
        tracing::info!(devices = count, "device registry loaded");
        Ok(count)
    }

    /// Insert a device or merge `update` into the existing one.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] for invalid or protocol-switching
    /// updates, [`HubError::InvalidTransition`] for a disallowed status, and
    /// [`HubError::Storage`] when the write fails.
    #[tracing::instrument(skip(self, update), fields(device_id = %update.id, protocol = %update.protocol))]
    pub async fn upsert(&self, update: DeviceUpdate) -> Result<Device, HubError> {
        self.apply(update, Vec::new()).await
    }

    /// [`upsert`](Self::upsert) a device and its entities in one store
    /// transaction. Entity `device_id`s are rewritten to the device's id.
    ///
    /// # Errors
    ///
    /// Same as [`upsert`](Self::upsert), plus [`HubError::Validation`] when an
    /// entity is invalid or would change capability kind.
    #[tracing::instrument(skip(self, update, entities), fields(device_id = %update.id, entities = entities.len()))]
    pub async fn upsert_with_entities(
        &self,
        update: DeviceUpdate,
        entities: Vec<Entity>,
    ) -> Result<Device, HubError> {
        self.apply(update, entities).await
    }

    async fn apply(&self, update: DeviceUpdate, entities: Vec<Entity>) -> Result<Device, HubError> {
        let slot = self.slot_or_insert(&update.id);
        let mut guard = slot.lock().await;
        let at = now();

        let (device, mut known) = match guard.as_ref() {
            Some(record) => {
                let mut device = record.device.clone();
                device.merge(update, at)?;
                (device, record.entities.clone())
            }
            None => (update.into_device(at)?, BTreeMap::new()),
        };

        let entities = entities
            .into_iter()
            .map(|mut entity| {
                entity.device_id = device.id.clone();
                entity.validate()?;
                if let Some(current) = known.get(&entity.key) {
                    current.ensure_same_kind(&entity)?;
                }
                Ok(entity)
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        if entities.is_empty() {
            self.store.save_device(&device).await?;
        } else {
            self.store.save_device_with_entities(&device, &entities).await?;
        }

        known.extend(entities.into_iter().map(|e| (e.key.clone(), e)));
        *guard = Some(Record {
            device: device.clone(),
            entities: known,
        });
        tracing::debug!(status = %device.status, "device upserted");
        Ok(device)
    }

    async fn modify<F>(&self, id: &DeviceId, change: F) -> Result<Device, HubError>
    where
        F: FnOnce(&mut Device, Timestamp) -> Result<(), HubError>,
    {
        let slot = self
            .slot(id)
            .ok_or_else(|| HubError::UnknownDevice(id.clone()))?;
        let mut guard = slot.lock().await;
        let record = guard
            .as_mut()
            .ok_or_else(|| HubError::UnknownDevice(id.clone()))?;

        let mut device = record.device.clone();
        change(&mut device, now())?;
        if device != record.device {
            self.store.save_device(&device).await?;
            record.device = device.clone();
        }
        Ok(device)
    }

    /// Move a device to `status` through the lifecycle state machine.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownDevice`], [`HubError::InvalidTransition`]
    /// (state unchanged), or [`HubError::Storage`].
    #[tracing::instrument(skip(self, id), fields(device_id = %id))]
    pub async fn set_status(&self, id: &DeviceId, status: DeviceStatus) -> Result<Device, HubError> {
        self.modify(id, |device, at| Ok(device.transition(status, at)?))
            .await
    }

    /// Soft-delete: the device is kept (with its entities) but hidden from
    /// [`list`](Self::list) by default.
    ///
    /// # Errors
    ///
    /// See [`set_status`](Self::set_status).
    pub async fn remove(&self, id: &DeviceId) -> Result<Device, HubError> {
        let device = self.set_status(id, DeviceStatus::Removed).await?;
        tracing::info!(device_id = %id, "device removed");
        Ok(device)
    }

    /// Refresh `last_seen`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownDevice`] or [`HubError::Storage`].
    pub async fn touch(&self, id: &DeviceId) -> Result<Device, HubError> {
        self.modify(id, |device, at| {
            device.last_seen = Some(at);
            Ok(())
        })
        .await
    }

    /// Insert or replace one entity of a known device.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownDevice`] for an unknown owner,
    /// [`HubError::Validation`] for an invalid entity or a capability kind
    /// change, and [`HubError::Storage`] when the write fails.
    #[tracing::instrument(skip(self, entity), fields(device_id = %entity.device_id, key = %entity.key))]
    pub async fn upsert_entity(&self, entity: Entity) -> Result<Entity, HubError> {
        entity.validate()?;
        let unknown = || HubError::UnknownDevice(entity.device_id.clone());
        let slot = self.slot(&entity.device_id).ok_or_else(unknown)?;
        let mut guard = slot.lock().await;
        let record = guard.as_mut().ok_or_else(unknown)?;

        if let Some(current) = record.entities.get(&entity.key) {
            current.ensure_same_kind(&entity)?;
        }
        self.store.save_entity(&entity).await?;
        record.entities.insert(entity.key.clone(), entity.clone());
        Ok(entity)
    }

    /// Entities of a device, ordered by key. Removed devices keep theirs.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownDevice`].
    pub async fn entities(&self, id: &DeviceId) -> Result<Vec<Entity>, HubError> {
        let slot = self
            .slot(id)
            .ok_or_else(|| HubError::UnknownDevice(id.clone()))?;
        let guard = slot.lock().await;
        guard
            .as_ref()
            .map(|record| record.entities.values().cloned().collect())
            .ok_or_else(|| HubError::UnknownDevice(id.clone()))
    }

    /// Look up a device, removed ones included.
    pub async fn get(&self, id: &DeviceId) -> Option<Device> {
        let slot = self.slot(id)?;
        let guard = slot.lock().await;
        guard.as_ref().map(|record| record.device.clone())
    }

    /// Like [`get`](Self::get) but fails for unknown ids.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownDevice`].
    pub async fn require(&self, id: &DeviceId) -> Result<Device, HubError> {
        self.get(id)
            .await
            .ok_or_else(|| HubError::UnknownDevice(id.clone()))
    }

    /// Devices matching `filter`, ordered by id.
    pub async fn list(&self, filter: &DeviceFilter) -> Vec<Device> {
        let mut devices = Vec::new();
        for slot in self.all_slots() {
            let guard = slot.lock().await;
            if let Some(record) = guard.as_ref() {
                if filter.matches(&record.device) {
                    devices.push(record.device.clone());
                }
            }
        }
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    /// Number of devices that are not removed.
    pub async fn count(&self) -> usize {
        self.list(&DeviceFilter::default()).await.len()
    }

    /// Status counts per protocol, removed devices excluded.
    pub async fn protocol_summaries(&self) -> BTreeMap<String, ProtocolSummary> {
        let mut summaries: BTreeMap<String, ProtocolSummary> = BTreeMap::new();
        for device in self.list(&DeviceFilter::default()).await {
            summaries
                .entry(device.protocol.to_string())
                .or_default()
                .record(device.status);
        }
        summaries
    }

    /// Flush and close the backing store.
    ///
    /// # Errors
    ///
    /// Propagates [`HubError::Storage`] from the store.
    pub async fn flush(&self) -> Result<(), HubError> {
        self.store.close().await
    }
}
