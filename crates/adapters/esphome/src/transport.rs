//! Session transport towards an ESPHome node.
//!
//! The driver only needs three calls from the native API: open a session
//! (returning the node's self-description), enumerate components, and close.
//! [`TcpTransport`] checks reachability with a plain TCP connect; native API
//! framing plugs in through [`EsphomeTransport`].

use futures::future::BoxFuture;
use tokio::net::TcpStream;

use crate::error::EsphomeError;
use crate::params::ConnectionParams;

/// What a node reports about itself when a session opens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeInfo {
    /// Node name as configured in its YAML (`esphome: name:`).
    pub name: Option<String>,
    pub friendly_name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
}

/// Light color modes advertised by a `light` component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    OnOff,
    Brightness,
    ColorTemperature,
    Rgb,
}

/// Component kinds the hub knows how to model.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentKind {
    Switch,
    BinarySensor,
    Fan,
    Sensor {
        unit: Option<String>,
        accuracy_decimals: Option<u8>,
    },
    Number {
        unit: Option<String>,
        min: f64,
        max: f64,
        step: f64,
    },
    Light {
        color_modes: Vec<ColorMode>,
        min_mireds: Option<u16>,
        max_mireds: Option<u16>,
    },
}

/// One entry of the node's component list.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Stable object id (`relay`, `living_room_temperature`).
    pub object_id: String,
    pub name: String,
    pub kind: ComponentKind,
}

/// Native API session operations used by the driver.
pub trait EsphomeTransport: Send + Sync {
    /// Open a session.
    fn open<'a>(
        &'a self,
        params: &'a ConnectionParams,
    ) -> BoxFuture<'a, Result<NodeInfo, EsphomeError>>;

    /// Enumerate the node's components over an open session.
    fn list_entities<'a>(
        &'a self,
        params: &'a ConnectionParams,
    ) -> BoxFuture<'a, Result<Vec<Component>, EsphomeError>>;

    /// Close the session. Closing an unknown session is not an error.
    fn close<'a>(&'a self, params: &'a ConnectionParams) -> BoxFuture<'a, Result<(), EsphomeError>>;
}

/// Reachability-only transport: a session is "open" when the API port
/// accepts a TCP connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl EsphomeTransport for TcpTransport {
    fn open<'a>(
        &'a self,
        params: &'a ConnectionParams,
    ) -> BoxFuture<'a, Result<NodeInfo, EsphomeError>> {
        Box::pin(async move {
            let stream = TcpStream::connect((params.host.as_str(), params.port))
                .await
                .map_err(|source| EsphomeError::Unreachable {
                    host: params.host.clone(),
                    port: params.port,
                    source,
                })?;
            tracing::debug!(
                host = %params.host,
                port = params.port,
                peer = ?stream.peer_addr().ok(),
                "esphome node reachable"
            );
            Ok(NodeInfo::default())
        })
    }

    fn list_entities<'a>(
        &'a self,
        _params: &'a ConnectionParams,
    ) -> BoxFuture<'a, Result<Vec<Component>, EsphomeError>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn close<'a>(&'a self, _params: &'a ConnectionParams) -> BoxFuture<'a, Result<(), EsphomeError>> {
        Box::pin(async { Ok(()) })
    }
}
