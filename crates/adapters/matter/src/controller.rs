//! Commissioning controller seam.
//!
//! Matter commissioning (PASE, attestation, operational credentials, CASE)
//! is delegated to a [`MatterController`]. [`UnavailableController`] is the
//! default when no controller is linked into the build.

use futures::future::BoxFuture;

use homehub_domain::error::DriverError;
use homehub_domain::id::DeviceId;

use crate::setup_code::SetupCode;

/// Operational node id assigned on the hub's fabric.
pub type NodeId = u64;

/// Server clusters the hub models as entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cluster {
    OnOff,
    LevelControl,
    ColorControl {
        color_temperature: bool,
        hue_saturation: bool,
        min_mireds: Option<u16>,
        max_mireds: Option<u16>,
    },
    TemperatureMeasurement,
    RelativeHumidityMeasurement,
    IlluminanceMeasurement,
}

/// One application endpoint of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub id: u16,
    pub clusters: Vec<Cluster>,
}

/// What the controller learned while commissioning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommissionedNode {
    pub node_id: NodeId,
    pub vendor_name: Option<String>,
    pub product_name: Option<String>,
    pub endpoints: Vec<Endpoint>,
}

/// Why commissioning or a session failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommissionError {
    #[error("no Matter controller is available")]
    Unavailable,

    #[error("no commissionable node matches the setup code")]
    NotFound,

    #[error("node rejected the setup code")]
    Rejected,

    #[error("controller transport failed: {0}")]
    Transport(String),
}

impl From<CommissionError> for DriverError {
    fn from(err: CommissionError) -> Self {
        match err {
            CommissionError::Rejected => Self::Auth(err.to_string()),
            CommissionError::Unavailable
            | CommissionError::NotFound
            | CommissionError::Transport(_) => Self::Connection(err.to_string()),
        }
    }
}

/// Everything a controller needs to commission one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissionRequest {
    pub device_id: DeviceId,
    pub setup_code: SetupCode,
}

/// Fabric-side operations of a Matter controller.
pub trait MatterController: Send + Sync {
    /// Commission the node described by `request` onto the hub's fabric.
    fn commission<'a>(
        &'a self,
        request: &'a CommissionRequest,
    ) -> BoxFuture<'a, Result<CommissionedNode, CommissionError>>;

    /// Open an operational (CASE) session.
    fn connect(&self, node_id: NodeId) -> BoxFuture<'_, Result<(), CommissionError>>;

    /// Drop the operational session, if any.
    fn disconnect(&self, node_id: NodeId) -> BoxFuture<'_, Result<(), CommissionError>>;
}

/// Controller used when the build has no Matter stack: every call fails
/// with [`CommissionError::Unavailable`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableController;

impl MatterController for UnavailableController {
    fn commission<'a>(
        &'a self,
        _request: &'a CommissionRequest,
    ) -> BoxFuture<'a, Result<CommissionedNode, CommissionError>> {
        Box::pin(async { Err(CommissionError::Unavailable) })
    }

    fn connect(&self, _node_id: NodeId) -> BoxFuture<'_, Result<(), CommissionError>> {
        Box::pin(async { Err(CommissionError::Unavailable) })
    }

    fn disconnect(&self, _node_id: NodeId) -> BoxFuture<'_, Result<(), CommissionError>> {
        Box::pin(async { Ok(()) })
    }
}
