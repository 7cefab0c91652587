//! [`ProtocolDriver`] for one Matter node.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;

use homehub_app::ports::{DriverContext, ProtocolDriver};
use homehub_domain::credentials::Credentials;
use homehub_domain::error::DriverError;
use homehub_domain::id::DeviceId;
use homehub_domain::pairing::PairingReport;

use crate::controller::{CommissionRequest, MatterController, NodeId};
use crate::mapping;
use crate::setup_code::SetupCode;

pub const SETUP_CODE: &str = "setup_code";
pub const NODE_ID: &str = "node_id";

/// Session with one commissioned Matter node.
pub struct MatterDriver {
    device_id: DeviceId,
    credentials: Option<Credentials>,
    controller: Arc<dyn MatterController>,
    connected: AtomicBool,
}

impl MatterDriver {
    #[must_use]
    pub fn new(context: DriverContext, controller: Arc<dyn MatterController>) -> Self {
        Self {
            device_id: context.device_id,
            credentials: context.credentials,
            controller,
            connected: AtomicBool::new(false),
        }
    }

    fn node_id(&self) -> Result<NodeId, DriverError> {
        let raw = self
            .credentials
            .as_ref()
            .and_then(|c| c.get_non_empty(NODE_ID))
            .ok_or_else(|| DriverError::Auth("device has not been commissioned".to_string()))?;
        raw.parse()
            .map_err(|_| DriverError::Auth(format!("stored node id {raw:?} is not a number")))
    }
}

impl ProtocolDriver for MatterDriver {
    fn connect(&self) -> BoxFuture<'_, Result<(), DriverError>> {
        Box::pin(async move {
            if self.is_connected() {
                return Err(DriverError::AlreadyConnected);
            }
            let node_id = self.node_id()?;
            self.controller.connect(node_id).await?;
            self.connected.store(true, Ordering::Release);
            tracing::info!(device_id = %self.device_id, node_id, "matter session opened");
            Ok(())
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<(), DriverError>> {
        Box::pin(async move {
            if self.connected.swap(false, Ordering::AcqRel) {
                let node_id = self.node_id()?;
                self.controller.disconnect(node_id).await?;
                tracing::info!(device_id = %self.device_id, node_id, "matter session closed");
            }
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
            let credentials = credentials.or_else(|| self.credentials.clone());
            let raw = credentials
                .as_ref()
                .and_then(|c| c.get_non_empty(SETUP_CODE))
                .ok_or_else(|| DriverError::pairing("a setup_code credential is required"))?;
            let setup_code: SetupCode = raw
                .parse()
                .map_err(|err| DriverError::pairing(format!("invalid setup code: {err}")))?;

            tracing::info!(
                device_id = %device_id,
                discriminator = ?setup_code.short_discriminator(),
                "commissioning matter node"
            );
            let request = CommissionRequest {
                device_id: device_id.clone(),
                setup_code,
            };
            let node = self
                .controller
                .commission(&request)
                .await
                .map_err(|err| DriverError::pairing(err.to_string()))?;

            Ok(PairingReport {
                device_id: DeviceId::new(format!("matter-{:016x}", node.node_id)).ok(),
                name: node.product_name.clone(),
                manufacturer: node.vendor_name,
                model: node.product_name,
                // The setup code is single-use; only the fabric node id is kept.
                credentials: Some(Credentials::new().with(NODE_ID, node.node_id.to_string())),
                entities: mapping::entities(&device_id, &node.endpoints),
            })
        })
    }
}
