//! Shared application state for axum handlers.

use std::sync::Arc;

use homehub_app::daemon::HubDaemon;
use homehub_app::ports::DeviceStore;

/// Application state shared across all axum handlers.
///
/// Generic over the store type to avoid dynamic dispatch. `Clone` is
/// implemented manually so the store itself does not need to be `Clone`.
pub struct AppState<S> {
    pub daemon: Arc<HubDaemon<S>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            daemon: Arc::clone(&self.daemon),
        }
    }
}

impl<S: DeviceStore> AppState<S> {
    #[must_use]
    pub fn new(daemon: Arc<HubDaemon<S>>) -> Self {
        Self { daemon }
    }
}
