//! Driver manager — owns the live driver session of every device.
//!
//! Pairing, connect and disconnect on one device id are serialized by a
//! per-device operation lock; different ids proceed concurrently. Every
//! driver call runs on its own task, bounded by a timeout and raced against
//! the daemon's shutdown token, so a hung or panicking driver only ever
//! degrades its own device.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{Mutex as OpLock, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use homehub_domain::credentials::Credentials;
use homehub_domain::device::{Device, DeviceStatus, DeviceUpdate};
use homehub_domain::error::{DriverError, DriverOperation, HubError, InvalidTransition, ValidationError};
use homehub_domain::id::DeviceId;
use homehub_domain::pairing::{PairingSession, PairingTarget};
use homehub_domain::protocol::ProtocolTag;
use homehub_domain::time::now;

use crate::driver_registry::DriverRegistry;
use crate::ports::{DeviceStore, DriverContext, DriverFactory, EventSink, ProtocolDriver};
use crate::registry::{DeviceFilter, DeviceRegistry};

/// Number of finished pairing sessions kept for diagnostics.
const HISTORY_LIMIT: usize = 32;

/// Upper bounds for driver calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverTimeouts {
    pub pairing: Duration,
    pub connect: Duration,
    pub disconnect: Duration,
}

impl Default for DriverTimeouts {
    fn default() -> Self {
        Self {
            pairing: Duration::from_secs(5),
            connect: Duration::from_secs(2),
            disconnect: Duration::from_secs(1),
        }
    }
}

/// Outcome of a successful [`DriverManager::start_pairing`].
#[derive(Debug, Clone)]
pub struct PairingResult {
    /// The device after pairing and the first connection attempt.
    pub device: Device,
    pub session: PairingSession,
}

/// What one [`DriverManager::check_liveness`] pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LivenessReport {
    pub checked: usize,
    pub reconnected: usize,
    pub failed: usize,
}

enum Liveness {
    Alive,
    Reconnected,
    Skipped,
}

struct Session {
    protocol: ProtocolTag,
    driver: Arc<dyn ProtocolDriver>,
}

/// Holds a pairing's operation lock. While `restore` is set, dropping it
/// puts the device back to `discovered` before the lock is released.
struct PairingGuard<S: DeviceStore> {
    registry: Arc<DeviceRegistry<S>>,
    device_id: DeviceId,
    lock: Option<OwnedMutexGuard<()>>,
    restore: bool,
}

impl<S: DeviceStore> PairingGuard<S> {
    /// Reset the device now instead of on drop.
    async fn restore_now(&mut self) {
        self.restore = false;
        if let Err(err) = self
            .registry
            .set_status(&self.device_id, DeviceStatus::Discovered)
            .await
        {
            tracing::warn!(device_id = %self.device_id, error = %err, "could not reset device to discovered");
        }
    }
}

impl<S: DeviceStore> Drop for PairingGuard<S> {
    fn drop(&mut self) {
        if !self.restore {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(device_id = %self.device_id, "pairing dropped outside a runtime, device left pairing");
            return;
        };
        let registry = Arc::clone(&self.registry);
        let device_id = self.device_id.clone();
        let lock = self.lock.take();
        tracing::info!(device_id = %device_id, "pairing abandoned, resetting device to discovered");
        runtime.spawn(async move {
            let _lock = lock;
            if let Err(err) = registry.set_status(&device_id, DeviceStatus::Discovered).await {
                tracing::warn!(device_id = %device_id, error = %err, "could not reset device to discovered");
            }
        });
    }
}

/// Run one driver call on its own task, bounded by `limit`.
///
/// Panics surface as [`DriverError::Crashed`]. When `shutdown` is given and
/// fires first, the task is aborted and [`DriverError::Cancelled`] returned.
async fn supervise<T, F>(
    operation: DriverOperation,
    limit: Duration,
    shutdown: Option<&CancellationToken>,
    call: F,
) -> Result<T, DriverError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, DriverError>> + Send + 'static,
{
    if shutdown.is_some_and(CancellationToken::is_cancelled) {
        return Err(DriverError::Cancelled(operation));
    }
    let task = tokio::spawn(call);
    let abort = task.abort_handle();
    let cancelled = async {
        match shutdown {
            Some(token) => token.cancelled().await,
            None => futures::future::pending::<()>().await,
        }
    };

    tokio::select! {
        joined = tokio::time::timeout(limit, task) => match joined {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => Err(DriverError::Crashed(err.to_string())),
            Err(_) => {
                abort.abort();
                Err(DriverError::Timeout { operation, after: limit })
            }
        },
        () = cancelled => {
            abort.abort();
            Err(DriverError::Cancelled(operation))
        }
    }
}

/// Supervisor of driver sessions.
pub struct DriverManager<S> {
    registry: Arc<DeviceRegistry<S>>,
    drivers: DriverRegistry,
    timeouts: DriverTimeouts,
    events: EventSink,
    shutdown: CancellationToken,
    sessions: RwLock<HashMap<DeviceId, Session>>,
    op_locks: Mutex<HashMap<DeviceId, Arc<OpLock<()>>>>,
    /// Devices the operator wants connected; the liveness check keeps them so.
    wanted: Mutex<HashSet<DeviceId>>,
    history: Mutex<VecDeque<PairingSession>>,
}

impl<S: DeviceStore> DriverManager<S> {
    pub fn new(
        registry: Arc<DeviceRegistry<S>>,
        drivers: DriverRegistry,
        timeouts: DriverTimeouts,
        events: EventSink,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            drivers,
            timeouts,
            events,
            shutdown,
            sessions: RwLock::default(),
            op_locks: Mutex::default(),
            wanted: Mutex::default(),
            history: Mutex::default(),
        }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry<S>> {
        &self.registry
    }

    pub fn drivers(&self) -> &DriverRegistry {
        &self.drivers
    }

    pub fn timeouts(&self) -> DriverTimeouts {
        self.timeouts
    }

    fn sessions(&self) -> RwLockWriteGuard<'_, HashMap<DeviceId, Session>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn session_driver(&self, id: &DeviceId) -> Option<Arc<dyn ProtocolDriver>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|session| Arc::clone(&session.driver))
    }

    fn wanted(&self) -> MutexGuard<'_, HashSet<DeviceId>> {
        self.wanted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn op_lock(&self, id: &DeviceId) -> Arc<OpLock<()>> {
        let mut locks = self.op_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(id.clone()).or_default())
    }

    fn forget_op_lock(&self, id: &DeviceId) {
        self.op_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    fn remember(&self, session: PairingSession) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push_front(session);
        history.truncate(HISTORY_LIMIT);
    }

    /// Recent pairing sessions, newest first.
    pub fn recent_sessions(&self) -> Vec<PairingSession> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Whether the device has a live driver session.
    pub fn is_connected(&self, id: &DeviceId) -> bool {
        self.session_driver(id)
            .is_some_and(|driver| driver.is_connected())
    }

    /// Live sessions per protocol tag.
    pub fn connected_by_protocol(&self) -> BTreeMap<String, usize> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let mut counts = BTreeMap::new();
        for session in sessions.values().filter(|s| s.driver.is_connected()) {
            *counts.entry(session.protocol.to_string()).or_default() += 1;
        }
        counts
    }

    /// Pair a device over `protocol`.
    ///
    /// On success the device is recorded as `paired` together with the
    /// entities the driver reported, then connected; a failing first
    /// connection leaves it in `error` but pairing still succeeds. On failure
    /// nothing is written for a device that did not exist before. A
    /// `discovered` device goes back to `discovered` when pairing fails or
    /// the returned future is dropped before it completes.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnsupportedProtocol`] when no driver serves
    /// `protocol`, [`HubError::Driver`] when the driver refuses, times out or
    /// is cancelled, and storage errors from the registry.
    #[tracing::instrument(skip(self, target))]
    pub async fn start_pairing(
        &self,
        protocol: &str,
        target: PairingTarget,
    ) -> Result<PairingResult, HubError> {
        let (tag, factory) = self.drivers.resolve(protocol)?;
        let PairingTarget {
            device_id,
            name,
            credentials,
        } = target;
        let device_id = device_id.unwrap_or_else(DeviceId::provisional);

        let mut guard = PairingGuard {
            registry: Arc::clone(&self.registry),
            device_id: device_id.clone(),
            lock: Some(self.op_lock(&device_id).lock_owned().await),
            restore: false,
        };

        let existing = self.registry.get(&device_id).await;
        if let Some(device) = &existing {
            if device.protocol != tag {
                return Err(ValidationError::ProtocolChanged {
                    device_id: device.id.clone(),
                    current: device.protocol.to_string(),
                    requested: tag.to_string(),
                }
                .into());
            }
            if device.status == DeviceStatus::Removed {
                return Err(InvalidTransition {
                    device_id: device.id.clone(),
                    from: DeviceStatus::Removed,
                    to: DeviceStatus::Pairing,
                }
                .into());
            }
        }
        let credentials = match (existing.as_ref().and_then(|d| d.credentials.clone()), credentials) {
            (Some(stored), Some(submitted)) => Some(stored.merged(&submitted)),
            (stored, submitted) => submitted.or(stored),
        };

        let mut session =
            PairingSession::open(device_id.clone(), tag.clone(), credentials.clone(), now());
        tracing::info!(session_id = %session.id, device_id = %device_id, "pairing started");

        guard.restore = match existing.as_ref().map(|d| d.status) {
            Some(DeviceStatus::Discovered) => {
                self.registry
                    .set_status(&device_id, DeviceStatus::Pairing)
                    .await?;
                true
            }
            Some(DeviceStatus::Pairing) => true,
            _ => false,
        };

        let paired = self
            .pair_and_record(&factory, &tag, &device_id, name, credentials)
            .await;
        let (device, _canonical_guard) = match paired {
            Ok(paired) => {
                guard.restore = false;
                paired
            }
            Err(err) => {
                tracing::warn!(session_id = %session.id, device_id = %device_id, error = %err, "pairing failed");
                if guard.restore {
                    guard.restore_now().await;
                }
                session.fail(err.to_string(), now());
                self.remember(session);
                drop(guard);
                if device_id.is_provisional() {
                    self.forget_op_lock(&device_id);
                }
                return Err(err);
            }
        };

        session.succeed(device.id.clone(), now());
        self.remember(session.clone());
        tracing::info!(session_id = %session.id, device_id = %device.id, "pairing succeeded");

        self.wanted().insert(device.id.clone());
        let device = match self.connect_locked(&device.id).await {
            Ok(device) => device,
            Err(err) if err.is_storage_fault() => return Err(err),
            Err(err) => {
                tracing::warn!(device_id = %device.id, error = %err, "paired device did not connect");
                self.registry.get(&device.id).await.unwrap_or(device)
            }
        };

        drop(guard);
        if device_id.is_provisional() {
            self.forget_op_lock(&device_id);
        }
        Ok(PairingResult { device, session })
    }

    /// Pair through a fresh driver and write the result. When the driver
    /// names a different id, that id's operation lock is taken before its
    /// record is touched and handed back to the caller.
    async fn pair_and_record(
        &self,
        factory: &Arc<dyn DriverFactory>,
        tag: &ProtocolTag,
        device_id: &DeviceId,
        name: Option<String>,
        credentials: Option<Credentials>,
    ) -> Result<(Device, Option<OwnedMutexGuard<()>>), HubError> {
        let context = DriverContext::new(device_id.clone(), credentials.clone())
            .with_events(self.events.clone());
        let driver = factory.create(context)?;

        let call = {
            let device_id = device_id.clone();
            let credentials = credentials.clone();
            async move { driver.pair(device_id, credentials).await }
        };
        let report = supervise(
            DriverOperation::Pair,
            self.timeouts.pairing,
            Some(&self.shutdown),
            call,
        )
        .await?;

        // Drivers may only rename devices the hub minted an id for.
        let final_id = match report.device_id {
            Some(canonical) if device_id.is_provisional() => canonical,
            _ => device_id.clone(),
        };
        let canonical_guard = if final_id == *device_id {
            None
        } else {
            Some(self.op_lock(&final_id).lock_owned().await)
        };
        let status = match self.registry.get(&final_id).await.map(|d| d.status) {
            None | Some(DeviceStatus::Pairing) => Some(DeviceStatus::Paired),
            Some(DeviceStatus::Discovered) => {
                self.registry
                    .set_status(&final_id, DeviceStatus::Pairing)
                    .await?;
                Some(DeviceStatus::Paired)
            }
            // Re-pairing keeps the current link status.
            Some(_) => None,
        };

        let update = DeviceUpdate {
            id: final_id,
            protocol: tag.clone(),
            name: name.or(report.name),
            status,
            manufacturer: report.manufacturer,
            model: report.model,
            credentials: report.credentials.or(credentials),
        };
        let device = self
            .registry
            .upsert_with_entities(update, report.entities)
            .await?;
        Ok((device, canonical_guard))
    }

    /// Open (or confirm) the driver session of a paired device.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownDevice`] without a registry entry,
    /// [`HubError::InvalidTransition`] for devices that are not paired, and
    /// [`HubError::Driver`] when the driver fails (the device is then in
    /// `error`).
    #[tracing::instrument(skip_all, fields(device_id = %id))]
    pub async fn connect_device(&self, id: &DeviceId) -> Result<Device, HubError> {
        self.registry.require(id).await?;
        let lock = self.op_lock(id);
        let _guard = lock.lock().await;
        self.wanted().insert(id.clone());
        self.connect_locked(id).await
    }

    async fn connect_locked(&self, id: &DeviceId) -> Result<Device, HubError> {
        let device = self.registry.require(id).await?;
        if !device.status.is_paired() {
            return Err(InvalidTransition {
                device_id: id.clone(),
                from: device.status,
                to: DeviceStatus::Online,
            }
            .into());
        }

        let driver = match self.session_driver(id) {
            Some(driver) => driver,
            None => {
                let (_, factory) = self.drivers.resolve(device.protocol.as_str())?;
                let context = DriverContext::new(id.clone(), device.credentials.clone())
                    .with_events(self.events.clone());
                match factory.create(context) {
                    Ok(driver) => driver,
                    Err(err) => return Err(self.degrade(&device, err).await),
                }
            }
        };

        let call = {
            let driver = Arc::clone(&driver);
            async move { driver.connect().await }
        };
        match supervise(
            DriverOperation::Connect,
            self.timeouts.connect,
            Some(&self.shutdown),
            call,
        )
        .await
        {
            Ok(()) | Err(DriverError::AlreadyConnected) => {
                self.sessions().insert(
                    id.clone(),
                    Session {
                        protocol: device.protocol.clone(),
                        driver,
                    },
                );
                let device = self.registry.set_status(id, DeviceStatus::Online).await?;
                tracing::info!(device_id = %id, "device online");
                Ok(device)
            }
            Err(err @ DriverError::Cancelled(_)) => Err(err.into()),
            Err(err) => {
                self.sessions().remove(id);
                Err(self.degrade(&device, err).await)
            }
        }
    }

    /// Record a driver fault on the device and turn it into the caller's
    /// error. A storage fault while recording wins over the driver error.
    async fn degrade(&self, device: &Device, err: DriverError) -> HubError {
        tracing::warn!(device_id = %device.id, protocol = %device.protocol, error = %err, "driver fault");
        match self
            .registry
            .set_status(&device.id, DeviceStatus::Error)
            .await
        {
            Err(status_err) if status_err.is_storage_fault() => status_err,
            Err(status_err) => {
                tracing::warn!(device_id = %device.id, error = %status_err, "device not moved to error");
                HubError::Driver(err)
            }
            Ok(_) => HubError::Driver(err),
        }
    }

    /// Close the driver session of a device and mark it `offline`.
    ///
    /// Safe to call when the device was never connected.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownDevice`] without a registry entry and
    /// [`HubError::Driver`] when the driver fails (the device is then in
    /// `error`).
    #[tracing::instrument(skip_all, fields(device_id = %id))]
    pub async fn disconnect_device(&self, id: &DeviceId) -> Result<Device, HubError> {
        self.registry.require(id).await?;
        let lock = self.op_lock(id);
        let _guard = lock.lock().await;
        self.wanted().remove(id);

        let session = self.sessions().remove(id);
        if let Some(session) = session {
            let driver = session.driver;
            let result = supervise(
                DriverOperation::Disconnect,
                self.timeouts.disconnect,
                Some(&self.shutdown),
                async move { driver.disconnect().await },
            )
            .await;
            match result {
                Ok(()) => {}
                Err(err @ DriverError::Cancelled(_)) => return Err(err.into()),
                Err(err) => {
                    let device = self.registry.require(id).await?;
                    return Err(self.degrade(&device, err).await);
                }
            }
        }

        let device = self.registry.require(id).await?;
        if device.status.is_paired() && device.status != DeviceStatus::Offline {
            let device = self.registry.set_status(id, DeviceStatus::Offline).await?;
            tracing::info!("device offline");
            return Ok(device);
        }
        Ok(device)
    }

    /// Disconnect (best effort) and soft-delete a device.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownDevice`] or registry errors.
    #[tracing::instrument(skip_all, fields(device_id = %id))]
    pub async fn remove_device(&self, id: &DeviceId) -> Result<Device, HubError> {
        self.registry.require(id).await?;
        let lock = self.op_lock(id);
        let _guard = lock.lock().await;
        self.wanted().remove(id);

        let session = self.sessions().remove(id);
        if let Some(session) = session {
            let driver = session.driver;
            if let Err(err) = supervise(
                DriverOperation::Disconnect,
                self.timeouts.disconnect,
                Some(&self.shutdown),
                async move { driver.disconnect().await },
            )
            .await
            {
                tracing::warn!(error = %err, "driver did not disconnect cleanly before removal");
            }
        }
        self.registry.remove(id).await
    }

    /// Disconnect every live session concurrently, each bounded by the
    /// disconnect timeout. Not subject to the shutdown token.
    ///
    /// Returns how many sessions closed cleanly.
    #[tracing::instrument(skip(self))]
    pub async fn disconnect_all(&self) -> usize {
        let sessions: Vec<(DeviceId, Session)> = self.sessions().drain().collect();
        let limit = self.timeouts.disconnect;
        let results = join_all(sessions.into_iter().map(|(id, session)| async move {
            let driver = session.driver;
            let result = supervise(DriverOperation::Disconnect, limit, None, async move {
                driver.disconnect().await
            })
            .await;
            (id, result)
        }))
        .await;

        let total = results.len();
        let mut released = 0;
        for (id, result) in results {
            match result {
                Ok(()) => released += 1,
                Err(err) => {
                    tracing::warn!(device_id = %id, error = %err, "driver did not disconnect cleanly");
                }
            }
        }
        tracing::info!(released, total, "driver sessions released");
        released
    }

    /// Mark devices that were online or failing when the hub last ran as
    /// wanted, so the next liveness pass reconnects them. Devices recorded
    /// `online` without a live session are moved to `offline` first.
    pub async fn resume(&self) -> usize {
        let devices = self.registry.list(&DeviceFilter::default()).await;
        let mut resumed = Vec::new();
        for device in devices {
            match device.status {
                DeviceStatus::Online => {
                    let lock = self.op_lock(&device.id);
                    let _guard = lock.lock().await;
                    if !self.is_connected(&device.id) {
                        if let Err(err) = self
                            .registry
                            .set_status(&device.id, DeviceStatus::Offline)
                            .await
                        {
                            tracing::warn!(device_id = %device.id, error = %err, "could not mark device offline");
                        }
                    }
                    resumed.push(device.id);
                }
                DeviceStatus::Error => resumed.push(device.id),
                _ => {}
            }
        }
        let mut wanted = self.wanted();
        let before = wanted.len();
        wanted.extend(resumed);
        wanted.len() - before
    }

    /// Probe every wanted device: refresh `last_seen` of live sessions and
    /// reconnect the ones that dropped (marking them `offline` first) or are
    /// in `error`. Devices with an operation in flight are skipped.
    ///
    /// # Errors
    ///
    /// Only storage faults are returned; driver failures are counted in the
    /// report.
    pub async fn check_liveness(&self) -> Result<LivenessReport, HubError> {
        let wanted: Vec<DeviceId> = self.wanted().iter().cloned().collect();
        let outcomes = join_all(wanted.iter().map(|id| self.check_one(id))).await;

        let mut report = LivenessReport::default();
        for outcome in outcomes {
            report.checked += 1;
            match outcome {
                Ok(Liveness::Alive | Liveness::Skipped) => {}
                Ok(Liveness::Reconnected) => report.reconnected += 1,
                Err(err) if err.is_storage_fault() => return Err(err),
                Err(_) => report.failed += 1,
            }
        }
        if report.reconnected > 0 || report.failed > 0 {
            tracing::info!(
                checked = report.checked,
                reconnected = report.reconnected,
                failed = report.failed,
                "liveness check"
            );
        }
        Ok(report)
    }

    async fn check_one(&self, id: &DeviceId) -> Result<Liveness, HubError> {
        let lock = self.op_lock(id);
        let Ok(_guard) = lock.try_lock() else {
            return Ok(Liveness::Skipped);
        };
        let device = match self.registry.get(id).await {
            Some(device) if device.status != DeviceStatus::Removed => device,
            _ => {
                self.wanted().remove(id);
                return Ok(Liveness::Skipped);
            }
        };
        if self.is_connected(id) {
            self.registry.touch(id).await?;
            return Ok(Liveness::Alive);
        }

        tracing::info!(device_id = %id, status = %device.status, "session lost, reconnecting");
        self.sessions().remove(id);
        if device.status == DeviceStatus::Online {
            self.registry.set_status(id, DeviceStatus::Offline).await?;
        }
        self.connect_locked(id).await?;
        Ok(Liveness::Reconnected)
    }
}
