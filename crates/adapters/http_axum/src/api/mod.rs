//! JSON REST API handler modules.

#[allow(clippy::missing_errors_doc)]
pub mod devices;
#[allow(clippy::missing_errors_doc)]
pub mod pairing;
pub mod status;

use axum::Router;
use axum::routing::{get, post};

use homehub_app::ports::DeviceStore;

use crate::state::AppState;

/// Build the `/api` sub-router.
pub fn routes<S: DeviceStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/status", get(status::get::<S>))
        // Devices
        .route("/devices", get(devices::list::<S>))
        .route(
            "/devices/{id}",
            get(devices::get::<S>).delete(devices::remove::<S>),
        )
        .route("/devices/{id}/entities", get(devices::entities::<S>))
        .route("/devices/{id}/connect", post(devices::connect::<S>))
        .route("/devices/{id}/disconnect", post(devices::disconnect::<S>))
        // Pairing
        .route("/pairing", post(pairing::start::<S>))
        .route("/pairing/sessions", get(pairing::sessions::<S>))
}
