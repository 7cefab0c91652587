//! In-memory port implementations shared by the unit tests.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use homehub_domain::credentials::Credentials;
use homehub_domain::device::Device;
use homehub_domain::entity::{Capability, Entity};
use homehub_domain::error::{DriverError, HubError};
use homehub_domain::id::DeviceId;
use homehub_domain::pairing::PairingReport;
use homehub_domain::protocol::ProtocolTag;

use crate::ports::{DeviceStore, DriverContext, DriverFactory, ProtocolDriver, StorageConfig};

#[derive(Default)]
struct Tables {
    devices: BTreeMap<DeviceId, Device>,
    entities: BTreeMap<(DeviceId, String), Entity>,
    fail_writes: bool,
    closed: bool,
}

/// Store kept in a process-wide table keyed by path, so a test can seed it
/// before the daemon opens it.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

fn shared() -> &'static Mutex<HashMap<PathBuf, MemoryStore>> {
    static STORES: OnceLock<Mutex<HashMap<PathBuf, MemoryStore>>> = OnceLock::new();
    STORES.get_or_init(Mutex::default)
}

/// Path `open` refuses with a storage error.
pub const UNUSABLE_PATH: &str = "/unusable/homehub.db";
/// Path `open` refuses with a schema mismatch.
pub const STALE_SCHEMA_PATH: &str = "/stale/homehub.db";

fn storage_error(message: &str) -> HubError {
    HubError::Storage(Box::new(std::io::Error::other(message.to_string())))
}

impl MemoryStore {
    /// Register (or fetch) the store `open` returns for `path`.
    pub fn at(path: &str) -> Self {
        shared()
            .lock()
            .unwrap()
            .entry(PathBuf::from(path))
            .or_default()
            .clone()
    }

    pub fn insert_device(&self, device: Device) {
        self.tables
            .lock()
            .unwrap()
            .devices
            .insert(device.id.clone(), device);
    }

    pub fn device(&self, id: &str) -> Option<Device> {
        let id = DeviceId::new(id).unwrap();
        self.tables.lock().unwrap().devices.get(&id).cloned()
    }

    pub fn entity_count(&self) -> usize {
        self.tables.lock().unwrap().entities.len()
    }

    pub fn device_count(&self) -> usize {
        self.tables.lock().unwrap().devices.len()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.tables.lock().unwrap().fail_writes = fail;
    }

    pub fn is_closed(&self) -> bool {
        self.tables.lock().unwrap().closed
    }

    fn write(&self, f: impl FnOnce(&mut Tables)) -> Result<(), HubError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.fail_writes {
            return Err(storage_error("disk full"));
        }
        f(&mut tables);
        Ok(())
    }
}

impl DeviceStore for MemoryStore {
    fn open(config: &StorageConfig) -> impl Future<Output = Result<Self, HubError>> + Send {
        let result = match config.path.to_str() {
            Some(UNUSABLE_PATH) => Err(storage_error("read-only file system")),
            Some(STALE_SCHEMA_PATH) => Err(HubError::SchemaMismatch {
                expected: 1,
                found: Some(0),
            }),
            Some(path) => Ok(Self::at(path)),
            None => Err(storage_error("non utf-8 path")),
        };
        async { result }
    }

    fn load_devices(&self) -> impl Future<Output = Result<Vec<Device>, HubError>> + Send {
        let devices = self.tables.lock().unwrap().devices.values().cloned().collect();
        async { Ok(devices) }
    }

    fn load_entities(&self) -> impl Future<Output = Result<Vec<Entity>, HubError>> + Send {
        let entities = self.tables.lock().unwrap().entities.values().cloned().collect();
        async { Ok(entities) }
    }

    fn save_device(&self, device: &Device) -> impl Future<Output = Result<(), HubError>> + Send {
        let result = self.write(|tables| {
            tables.devices.insert(device.id.clone(), device.clone());
        });
        async { result }
    }

    fn save_device_with_entities(
        &self,
        device: &Device,
        entities: &[Entity],
    ) -> impl Future<Output = Result<(), HubError>> + Send {
        let result = self.write(|tables| {
            tables.devices.insert(device.id.clone(), device.clone());
            for entity in entities {
                tables
                    .entities
                    .insert((entity.device_id.clone(), entity.key.clone()), entity.clone());
            }
        });
        async { result }
    }

    fn save_entity(&self, entity: &Entity) -> impl Future<Output = Result<(), HubError>> + Send {
        let result = self.write(|tables| {
            tables
                .entities
                .insert((entity.device_id.clone(), entity.key.clone()), entity.clone());
        });
        async { result }
    }

    fn close(&self) -> impl Future<Output = Result<(), HubError>> + Send {
        self.tables.lock().unwrap().closed = true;
        async { Ok(()) }
    }
}

/// Knobs shared by every driver a [`ScriptedFactory`] creates.
#[derive(Default)]
pub struct Script {
    pub pair_error: Mutex<Option<DriverError>>,
    pub pair_delay: Mutex<Option<Duration>>,
    pub canonical_id: Mutex<Option<DeviceId>>,
    /// Number of upcoming connects that hang forever.
    pub hang_connects: AtomicUsize,
    pub connect_error: Mutex<Option<DriverError>>,
    pub connect_delay: Mutex<Option<Duration>>,
    pub panic_on_connect: AtomicBool,
    pub hang_disconnect: AtomicBool,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub barrier: Mutex<Option<Arc<tokio::sync::Barrier>>>,
}

/// Driver whose behaviour is dictated by a shared [`Script`].
pub struct ScriptedDriver {
    script: Arc<Script>,
    connected: AtomicBool,
}

impl ScriptedDriver {
    async fn run_connect(&self) -> Result<(), DriverError> {
        let script = &self.script;
        if self.connected.load(Ordering::SeqCst) {
            return Err(DriverError::AlreadyConnected);
        }
        script.connects.fetch_add(1, Ordering::SeqCst);
        let in_flight = script.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        script.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let hang = script
            .hang_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hang {
            futures::future::pending::<()>().await;
        }
        assert!(
            !script.panic_on_connect.load(Ordering::SeqCst),
            "driver blew up"
        );
        let barrier = script.barrier.lock().unwrap().clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
        let delay = *script.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        script.in_flight.fetch_sub(1, Ordering::SeqCst);

        let error = script.connect_error.lock().unwrap().clone();
        match error {
            Some(err) => Err(err),
            None => {
                self.connected.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    pub fn drop_session(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl ProtocolDriver for ScriptedDriver {
    fn connect(&self) -> BoxFuture<'_, Result<(), DriverError>> {
        self.run_connect().boxed()
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<(), DriverError>> {
        async move {
            self.script.disconnects.fetch_add(1, Ordering::SeqCst);
            if self.script.hang_disconnect.load(Ordering::SeqCst) {
                futures::future::pending::<()>().await;
            }
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn pair(
        &self,
        device_id: DeviceId,
        credentials: Option<Credentials>,
    ) -> BoxFuture<'_, Result<PairingReport, DriverError>> {
        async move {
            let delay = *self.script.pair_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let pair_error = self.script.pair_error.lock().unwrap().clone();
            if let Some(err) = pair_error {
                return Err(err);
            }
            let device_id = self
                .script
                .canonical_id
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(device_id);
            let power = Entity::builder()
                .device_id(device_id.clone())
                .key("power")
                .capability(Capability::OnOff)
                .build()
                .map_err(|err| DriverError::pairing(err.to_string()))?;
            Ok(PairingReport {
                device_id: Some(device_id),
                manufacturer: Some("Acme".to_string()),
                credentials,
                entities: vec![power],
                ..PairingReport::default()
            })
        }
        .boxed()
    }
}

/// Factory handing out [`ScriptedDriver`]s and remembering them by device.
pub struct ScriptedFactory {
    protocol: &'static str,
    pub script: Arc<Script>,
    pub created: Mutex<Vec<(DeviceId, Arc<ScriptedDriver>)>>,
}

impl ScriptedFactory {
    pub fn new(protocol: &'static str) -> Arc<Self> {
        Arc::new(Self {
            protocol,
            script: Arc::new(Script::default()),
            created: Mutex::new(Vec::new()),
        })
    }

    /// Most recent driver built for `id`.
    pub fn last_driver(&self, id: &str) -> Option<Arc<ScriptedDriver>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(device_id, _)| device_id.as_str() == id)
            .map(|(_, driver)| Arc::clone(driver))
    }
}

impl DriverFactory for ScriptedFactory {
    fn protocol(&self) -> ProtocolTag {
        ProtocolTag::new(self.protocol).unwrap()
    }

    fn create(&self, context: DriverContext) -> Result<Arc<dyn ProtocolDriver>, DriverError> {
        let driver = Arc::new(ScriptedDriver {
            script: Arc::clone(&self.script),
            connected: AtomicBool::new(false),
        });
        self.created
            .lock()
            .unwrap()
            .push((context.device_id, Arc::clone(&driver)));
        Ok(driver)
    }
}
