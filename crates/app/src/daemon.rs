//! Hub daemon — lifecycle supervisor of the device registry and driver
//! manager.
//!
//! ```text
//! created → initializing → ready → running → stopping → stopped
//!                ↓                    ↓
//!              error ───────────────→ stopping
//! ```
//!
//! The state lives in a `watch` channel so callers (the binary, the HTTP
//! API) can observe it; every transition is a compare-and-set on that
//! channel.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use homehub_domain::device::{DeviceStatus, DeviceUpdate};
use homehub_domain::error::HubError;
use homehub_domain::event::DriverEvent;
use homehub_domain::status::{DaemonState, DaemonStatus, ProtocolSummary};

use crate::driver_manager::{DriverManager, DriverTimeouts};
use crate::driver_registry::DriverRegistry;
use crate::ports::{DeviceStore, EventSink, StorageConfig};
use crate::registry::DeviceRegistry;

/// Runtime settings handed to [`HubDaemon::initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub storage: StorageConfig,
    pub timeouts: DriverTimeouts,
    /// Period of the liveness check.
    pub liveness_interval: Duration,
    /// Capacity of the driver event queue.
    pub event_buffer: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            timeouts: DriverTimeouts::default(),
            liveness_interval: Duration::from_secs(30),
            event_buffer: 256,
        }
    }
}

struct Components<S> {
    registry: Arc<DeviceRegistry<S>>,
    manager: Arc<DriverManager<S>>,
    sink: EventSink,
    events: Mutex<Option<mpsc::Receiver<DriverEvent>>>,
    liveness_interval: Duration,
}

/// Move `state` to `next` if it currently is one of `from`.
///
/// Returns the previous state, or the current one when the move is refused.
fn advance(
    state: &watch::Sender<DaemonState>,
    from: &[DaemonState],
    next: DaemonState,
) -> Result<DaemonState, DaemonState> {
    let mut outcome = Err(next);
    state.send_if_modified(|current| {
        if from.contains(current) {
            outcome = Ok(*current);
            *current = next;
            true
        } else {
            outcome = Err(*current);
            false
        }
    });
    outcome
}

/// The hub daemon. Create one per process and share it behind an `Arc`.
pub struct HubDaemon<S> {
    drivers: DriverRegistry,
    state: Arc<watch::Sender<DaemonState>>,
    components: OnceLock<Components<S>>,
    shutdown: CancellationToken,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl<S: DeviceStore> HubDaemon<S> {
    /// Create a daemon in the `created` state.
    pub fn new(drivers: DriverRegistry) -> Self {
        let (state, _) = watch::channel(DaemonState::Created);
        Self {
            drivers,
            state: Arc::new(state),
            components: OnceLock::new(),
            shutdown: CancellationToken::new(),
            event_loop: Mutex::new(None),
        }
    }

    pub fn state(&self) -> DaemonState {
        *self.state.borrow()
    }

    /// Watch lifecycle changes.
    pub fn subscribe(&self) -> watch::Receiver<DaemonState> {
        self.state.subscribe()
    }

    pub fn drivers(&self) -> &DriverRegistry {
        &self.drivers
    }

    fn components(&self) -> Result<&Components<S>, HubError> {
        self.components.get().ok_or_else(|| HubError::NotReady {
            state: self.state(),
        })
    }

    /// # Errors
    ///
    /// Returns [`HubError::NotReady`] before a successful
    /// [`initialize`](Self::initialize).
    pub fn registry(&self) -> Result<&Arc<DeviceRegistry<S>>, HubError> {
        self.components().map(|c| &c.registry)
    }

    /// # Errors
    ///
    /// Returns [`HubError::NotReady`] before a successful
    /// [`initialize`](Self::initialize).
    pub fn manager(&self) -> Result<&Arc<DriverManager<S>>, HubError> {
        self.components().map(|c| &c.manager)
    }

    /// Sink for discovery sources living outside the drivers.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotReady`] before a successful
    /// [`initialize`](Self::initialize).
    pub fn event_sink(&self) -> Result<EventSink, HubError> {
        self.components().map(|c| c.sink.clone())
    }

    /// Open storage and load the device registry.
    ///
    /// Any failure is fatal: the daemon moves to `error` and can only be
    /// stopped.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotReady`] unless the daemon is `created`,
    /// [`HubError::Storage`] when the store cannot be opened or read, and
    /// [`HubError::SchemaMismatch`] when it was not migrated for this build.
    #[tracing::instrument(skip_all, fields(path = %config.storage.path.display()))]
    pub async fn initialize(&self, config: DaemonConfig) -> Result<(), HubError> {
        advance(&self.state, &[DaemonState::Created], DaemonState::Initializing)
            .map_err(|state| HubError::NotReady { state })?;
        tracing::info!("initializing hub daemon");

        match self.bootstrap(config).await {
            Ok(components) => {
                if self.components.set(components).is_err() {
                    tracing::error!("daemon components were already set");
                }
                self.state.send_replace(DaemonState::Ready);
                tracing::info!("hub daemon ready");
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "hub daemon failed to initialize");
                self.state.send_replace(DaemonState::Error);
                Err(err)
            }
        }
    }

    async fn bootstrap(&self, config: DaemonConfig) -> Result<Components<S>, HubError> {
        let store = S::open(&config.storage).await?;
        let registry = Arc::new(DeviceRegistry::new(store));
        registry.load().await?;

        let (sender, receiver) = mpsc::channel(config.event_buffer.max(1));
        let sink = EventSink::new(sender);
        let manager = Arc::new(DriverManager::new(
            Arc::clone(&registry),
            self.drivers.clone(),
            config.timeouts,
            sink.clone(),
            self.shutdown.child_token(),
        ));
        Ok(Components {
            registry,
            manager,
            sink,
            events: Mutex::new(Some(receiver)),
            liveness_interval: config.liveness_interval,
        })
    }

    /// Start processing driver events and liveness checks.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::AlreadyRunning`] when called twice and
    /// [`HubError::NotReady`] from any state other than `ready`.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self) -> Result<(), HubError> {
        match advance(&self.state, &[DaemonState::Ready], DaemonState::Running) {
            Ok(_) => {}
            Err(DaemonState::Running) => return Err(HubError::AlreadyRunning),
            Err(state) => return Err(HubError::NotReady { state }),
        }
        let components = self.components()?;
        let events = components
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(HubError::NotReady {
                state: DaemonState::Running,
            })?;
        let resumed = components.manager.resume().await;

        let event_loop = EventLoop {
            registry: Arc::clone(&components.registry),
            manager: Arc::clone(&components.manager),
            state: Arc::clone(&self.state),
            shutdown: self.shutdown.clone(),
            events,
            liveness_interval: components.liveness_interval,
        };
        let handle = tokio::spawn(event_loop.run());
        *self
            .event_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        tracing::info!(resumed, "hub daemon running");
        Ok(())
    }

    /// Cancel in-flight driver work, disconnect every session (best effort,
    /// bounded per driver), flush the registry and move to `stopped`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotReady`] from `created`, `initializing` or
    /// `stopping`, and the storage error when flushing fails (the daemon is
    /// then in `error` and `stop` may be retried).
    #[tracing::instrument(skip(self))]
    pub async fn stop(&self) -> Result<(), HubError> {
        match advance(
            &self.state,
            &[DaemonState::Ready, DaemonState::Running, DaemonState::Error],
            DaemonState::Stopping,
        ) {
            Ok(_) => {}
            Err(DaemonState::Stopped) => return Ok(()),
            Err(state) => return Err(HubError::NotReady { state }),
        }
        tracing::info!("stopping hub daemon");
        self.shutdown.cancel();

        let handle = self
            .event_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "event loop ended abnormally");
            }
        }

        if let Some(components) = self.components.get() {
            components.manager.disconnect_all().await;
            if let Err(err) = components.registry.flush().await {
                tracing::error!(error = %err, "failed to flush device registry");
                self.state.send_replace(DaemonState::Error);
                return Err(err);
            }
        }
        self.state.send_replace(DaemonState::Stopped);
        tracing::info!("hub daemon stopped");
        Ok(())
    }

    /// Current state, device count and per-protocol summary.
    pub async fn get_status(&self) -> DaemonStatus {
        let state = self.state();
        let Ok(components) = self.components() else {
            return DaemonStatus {
                state,
                ..DaemonStatus::default()
            };
        };

        let mut protocols: BTreeMap<String, ProtocolSummary> = self
            .drivers
            .protocols()
            .map(|tag| (tag.to_string(), ProtocolSummary::default()))
            .collect();
        protocols.extend(components.registry.protocol_summaries().await);
        for (protocol, connected) in components.manager.connected_by_protocol() {
            protocols.entry(protocol).or_default().connected = connected;
        }
        DaemonStatus {
            state,
            device_count: protocols.values().map(|s| s.devices).sum(),
            protocols,
        }
    }
}

struct EventLoop<S> {
    registry: Arc<DeviceRegistry<S>>,
    manager: Arc<DriverManager<S>>,
    state: Arc<watch::Sender<DaemonState>>,
    shutdown: CancellationToken,
    events: mpsc::Receiver<DriverEvent>,
    liveness_interval: Duration,
}

impl<S: DeviceStore> EventLoop<S> {
    async fn run(self) {
        let Self {
            registry,
            manager,
            state,
            shutdown,
            mut events,
            liveness_interval,
        } = self;
        let mut liveness = tokio::time::interval(liveness_interval);
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let outcome = tokio::select! {
                () = shutdown.cancelled() => break,
                Some(event) = events.recv() => apply_event(&registry, event).await,
                _ = liveness.tick() => manager.check_liveness().await.map(|_| ()),
            };
            match outcome {
                Ok(()) => {}
                Err(err) if err.is_storage_fault() => {
                    tracing::error!(error = %err, "storage fault, hub daemon degraded");
                    advance(&state, &[DaemonState::Running], DaemonState::Error).ok();
                    break;
                }
                Err(err) => tracing::warn!(error = %err, "driver event rejected"),
            }
        }
        tracing::debug!("event loop stopped");
    }
}

async fn apply_event<S: DeviceStore>(
    registry: &DeviceRegistry<S>,
    event: DriverEvent,
) -> Result<(), HubError> {
    tracing::debug!(device_id = %event.device_id(), kind = event.kind(), "driver event");
    match event {
        DriverEvent::DeviceFound(found) => {
            let update = match registry.get(&found.device_id).await {
                None => DeviceUpdate {
                    id: found.device_id,
                    protocol: found.protocol,
                    name: found.name,
                    status: Some(DeviceStatus::Discovered),
                    manufacturer: found.manufacturer,
                    model: found.model,
                    credentials: found.credentials,
                },
                Some(device) if device.status == DeviceStatus::Removed => {
                    tracing::debug!(device_id = %device.id, "ignoring announcement of removed device");
                    return Ok(());
                }
                Some(_) => DeviceUpdate {
                    manufacturer: found.manufacturer,
                    model: found.model,
                    ..DeviceUpdate::new(found.device_id, found.protocol)
                },
            };
            registry.upsert(update).await.map(|_| ())
        }
        DriverEvent::StatusChanged { device_id, status } => {
            registry.set_status(&device_id, status).await.map(|_| ())
        }
        DriverEvent::EntityReported(entity) => registry.upsert_entity(entity).await.map(|_| ()),
    }
}
