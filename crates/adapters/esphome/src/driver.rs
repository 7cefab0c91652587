//! [`ProtocolDriver`] for one ESPHome node.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;

use homehub_app::ports::{DriverContext, ProtocolDriver};
use homehub_domain::credentials::Credentials;
use homehub_domain::error::DriverError;
use homehub_domain::id::DeviceId;
use homehub_domain::pairing::PairingReport;

use crate::config::EsphomeConfig;
use crate::error::EsphomeError;
use crate::mapping;
use crate::params::ConnectionParams;
use crate::transport::EsphomeTransport;

const DEFAULT_MANUFACTURER: &str = "Espressif";

/// Session with one ESPHome node.
pub struct EsphomeDriver {
    device_id: DeviceId,
    credentials: Option<Credentials>,
    config: EsphomeConfig,
    transport: Arc<dyn EsphomeTransport>,
    /// Parameters of the open session, `None` while disconnected.
    session: Mutex<Option<ConnectionParams>>,
}

impl EsphomeDriver {
    #[must_use]
    pub fn new(
        context: DriverContext,
        config: EsphomeConfig,
        transport: Arc<dyn EsphomeTransport>,
    ) -> Self {
        Self {
            device_id: context.device_id,
            credentials: context.credentials,
            config,
            transport,
            session: Mutex::new(None),
        }
    }

    fn session(&self) -> MutexGuard<'_, Option<ConnectionParams>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn params(
        &self,
        device_id: &DeviceId,
        credentials: Option<&Credentials>,
    ) -> Result<ConnectionParams, EsphomeError> {
        let params = ConnectionParams::resolve(device_id, credentials, self.config.port)?;
        if self.config.require_encryption && !params.is_encrypted() {
            return Err(EsphomeError::EncryptionRequired);
        }
        Ok(params)
    }
}

fn pairing_error(err: EsphomeError) -> DriverError {
    DriverError::pairing(err.to_string())
}

impl ProtocolDriver for EsphomeDriver {
    fn connect(&self) -> BoxFuture<'_, Result<(), DriverError>> {
        Box::pin(async move {
            if self.is_connected() {
                return Err(DriverError::AlreadyConnected);
            }
            let params = self.params(&self.device_id, self.credentials.as_ref())?;
            self.transport.open(&params).await?;
            tracing::info!(
                device_id = %self.device_id,
                host = %params.host,
                port = params.port,
                encrypted = params.is_encrypted(),
                "esphome session opened"
            );
            *self.session() = Some(params);
            Ok(())
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<(), DriverError>> {
        Box::pin(async move {
            let params = self.session().take();
            if let Some(params) = params {
                self.transport.close(&params).await?;
                tracing::info!(device_id = %self.device_id, "esphome session closed");
            }
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.session().is_some()
    }

    fn pair(
        &self,
        device_id: DeviceId,
        credentials: Option<Credentials>,
    ) -> BoxFuture<'_, Result<PairingReport, DriverError>> {
        Box::pin(async move {
            let credentials = credentials.or_else(|| self.credentials.clone());
            let params = self
                .params(&device_id, credentials.as_ref())
                .map_err(pairing_error)?;
            if !params.is_encrypted() {
                tracing::warn!(
                    device_id = %device_id,
                    "pairing esphome node without an encryption key"
                );
            }

            let info = self.transport.open(&params).await.map_err(pairing_error)?;
            let components = self.transport.list_entities(&params).await;
            if let Err(err) = self.transport.close(&params).await {
                tracing::debug!(device_id = %device_id, error = %err, "esphome close after pairing failed");
            }
            let components = components.map_err(pairing_error)?;

            Ok(PairingReport {
                device_id: info.name.as_deref().and_then(|name| DeviceId::new(name).ok()),
                name: info.friendly_name.or(info.name),
                manufacturer: Some(
                    info.manufacturer
                        .unwrap_or_else(|| DEFAULT_MANUFACTURER.to_string()),
                ),
                model: info.model,
                credentials: Some(params.to_credentials()),
                entities: mapping::entities(&device_id, &components),
            })
        })
    }
}
