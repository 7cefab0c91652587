//! [`ProtocolDriver`] for one simulated device.

use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;

use homehub_app::ports::{DriverContext, EventSink, ProtocolDriver};
use homehub_domain::credentials::Credentials;
use homehub_domain::error::DriverError;
use homehub_domain::event::DriverEvent;
use homehub_domain::id::DeviceId;
use homehub_domain::pairing::PairingReport;

use crate::behaviour::Behaviour;
use crate::devices::{self, VirtualSensor};

/// A simulated device session.
pub struct VirtualDriver {
    device_id: DeviceId,
    behaviour: Behaviour,
    connected: AtomicBool,
    events: EventSink,
}

impl VirtualDriver {
    #[must_use]
    pub fn new(context: DriverContext) -> Self {
        Self {
            behaviour: Behaviour::from_credentials(context.credentials.as_ref()),
            device_id: context.device_id,
            connected: AtomicBool::new(false),
            events: context.events,
        }
    }

    #[must_use]
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Drop the session as if the link was lost, without telling anyone.
    pub fn drop_session(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            tracing::info!(device_id = %self.device_id, "virtual session dropped");
        }
    }

    async fn simulate_latency(&self) {
        if !self.behaviour.latency.is_zero() {
            tokio::time::sleep(self.behaviour.latency).await;
        }
    }
}

impl ProtocolDriver for VirtualDriver {
    fn connect(&self) -> BoxFuture<'_, Result<(), DriverError>> {
        Box::pin(async move {
            self.simulate_latency().await;
            if self.behaviour.hang_connect {
                std::future::pending::<()>().await;
            }
            if self.behaviour.fail_connect {
                return Err(DriverError::Connection(
                    "simulated connection failure".to_string(),
                ));
            }
            if self.connected.swap(true, Ordering::AcqRel) {
                return Err(DriverError::AlreadyConnected);
            }

            match VirtualSensor::reading(
                &self.device_id,
                VirtualSensor::INITIAL_READING,
                homehub_domain::time::now(),
            ) {
                Ok(reading) => self.events.emit(DriverEvent::EntityReported(reading)),
                Err(err) => tracing::warn!(device_id = %self.device_id, error = %err, "cannot build reading"),
            }
            Ok(())
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<(), DriverError>> {
        Box::pin(async move {
            self.simulate_latency().await;
            self.connected.store(false, Ordering::Release);
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn pair(
        &self,
        device_id: DeviceId,
        credentials: Option<Credentials>,
    ) -> BoxFuture<'_, Result<PairingReport, DriverError>> {
        Box::pin(async move {
            self.simulate_latency().await;
            let behaviour = credentials
                .as_ref()
                .map_or(self.behaviour, |c| Behaviour::from_credentials(Some(c)));
            if behaviour.fail_pair {
                return Err(DriverError::pairing("simulated pairing failure"));
            }
            let entities = devices::entities(&device_id)
                .map_err(|err| DriverError::pairing(err.to_string()))?;

            Ok(PairingReport {
                device_id: None,
                name: Some("Virtual Device".to_string()),
                manufacturer: Some("homehub".to_string()),
                model: Some("virtual-1".to_string()),
                credentials: None,
                entities,
            })
        })
    }
}
