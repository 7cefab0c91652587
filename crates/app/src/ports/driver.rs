//! Protocol driver port — one protocol family behind a uniform contract.
//!
//! Drivers of different protocols live side by side behind
//! `Arc<dyn ProtocolDriver>`, so the methods return boxed futures instead of
//! `impl Future`.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use homehub_domain::credentials::Credentials;
use homehub_domain::error::DriverError;
use homehub_domain::event::DriverEvent;
use homehub_domain::id::DeviceId;
use homehub_domain::pairing::PairingReport;
use homehub_domain::protocol::ProtocolTag;

/// Session with one device over one protocol.
///
/// Connection policy: calling [`connect`](Self::connect) on a live session
/// returns [`DriverError::AlreadyConnected`]; the driver manager treats that
/// as a successful no-op.
pub trait ProtocolDriver: Send + Sync {
    /// Establish the session.
    ///
    /// Fails with [`DriverError::Connection`] on network or protocol failure
    /// and [`DriverError::Auth`] when credentials are invalid or missing.
    fn connect(&self) -> BoxFuture<'_, Result<(), DriverError>>;

    /// Release the session. Safe to call when never connected.
    fn disconnect(&self) -> BoxFuture<'_, Result<(), DriverError>>;

    /// Current session state. Never blocks, never has side effects.
    fn is_connected(&self) -> bool;

    /// Protocol-specific commissioning.
    ///
    /// For protocols without an explicit handshake this validates the key
    /// material and succeeds.
    fn pair(
        &self,
        device_id: DeviceId,
        credentials: Option<Credentials>,
    ) -> BoxFuture<'_, Result<PairingReport, DriverError>>;
}

/// Where drivers send what they observe outside of a request.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: mpsc::Sender<DriverEvent>,
}

impl EventSink {
    #[must_use]
    pub fn new(sender: mpsc::Sender<DriverEvent>) -> Self {
        Self { sender }
    }

    /// A sink whose events go nowhere.
    #[must_use]
    pub fn detached() -> Self {
        let (sender, _) = mpsc::channel(1);
        Self { sender }
    }

    /// Queue an event without waiting. Events are dropped (and logged) when
    /// the daemon is not keeping up or has stopped listening.
    pub fn emit(&self, event: DriverEvent) {
        if let Err(err) = self.sender.try_send(event) {
            let event = match &err {
                mpsc::error::TrySendError::Full(event) | mpsc::error::TrySendError::Closed(event) => {
                    event
                }
            };
            tracing::debug!(
                device_id = %event.device_id(),
                kind = event.kind(),
                error = %err,
                "driver event dropped"
            );
        }
    }
}

/// Everything a factory needs to build a driver for one device.
#[derive(Debug, Clone)]
pub struct DriverContext {
    pub device_id: DeviceId,
    pub credentials: Option<Credentials>,
    pub events: EventSink,
}

impl DriverContext {
    #[must_use]
    pub fn new(device_id: DeviceId, credentials: Option<Credentials>) -> Self {
        Self {
            device_id,
            credentials,
            events: EventSink::detached(),
        }
    }

    #[must_use]
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Look up a non-blank credential entry.
    #[must_use]
    pub fn credential(&self, key: &str) -> Option<&str> {
        self.credentials.as_ref().and_then(|c| c.get_non_empty(key))
    }
}

/// Builds driver instances for one protocol tag.
pub trait DriverFactory: Send + Sync {
    /// The tag this factory serves.
    fn protocol(&self) -> ProtocolTag;

    /// Build a driver bound to `context.device_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] when the stored parameters cannot describe a
    /// session (malformed host, port, key, …).
    fn create(&self, context: DriverContext) -> Result<Arc<dyn ProtocolDriver>, DriverError>;
}
