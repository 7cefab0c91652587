//! JSON REST handlers for devices and their entities.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use homehub_app::ports::DeviceStore;
use homehub_app::registry::DeviceFilter;
use homehub_domain::device::{Device, DeviceStatus};
use homehub_domain::entity::Entity;
use homehub_domain::error::HubError;
use homehub_domain::id::DeviceId;
use homehub_domain::protocol::ProtocolTag;

use crate::error::ApiError;
use crate::state::AppState;

/// Query string of the list endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub protocol: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub include_removed: bool,
}

impl ListQuery {
    fn into_filter(self) -> Result<DeviceFilter, ApiError> {
        let protocol = self
            .protocol
            .map(ProtocolTag::new)
            .transpose()
            .map_err(HubError::from)?;
        let status = self
            .status
            .map(|raw| raw.parse::<DeviceStatus>())
            .transpose()
            .map_err(|err| ApiError::BadRequest(err.to_string()))?;
        Ok(DeviceFilter {
            protocol,
            status,
            include_removed: self.include_removed,
        })
    }
}

/// Possible responses from the list endpoint.
pub enum ListResponse {
    Ok(Json<Vec<Device>>),
}

impl IntoResponse for ListResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

/// Possible responses from endpoints returning a single device.
pub enum DeviceResponse {
    Ok(Json<Device>),
}

impl IntoResponse for DeviceResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

/// Possible responses from the entities endpoint.
pub enum EntitiesResponse {
    Ok(Json<Vec<Entity>>),
}

impl IntoResponse for EntitiesResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

fn parse_id(raw: &str) -> Result<DeviceId, ApiError> {
    raw.parse::<DeviceId>()
        .map_err(|err| ApiError::from(HubError::from(err)))
}

/// `GET /api/devices`
///
/// Removed devices are hidden unless `include_removed=true`.
pub async fn list<S: DeviceStore>(
    State(state): State<AppState<S>>,
    Query(query): Query<ListQuery>,
) -> Result<ListResponse, ApiError> {
    let filter = query.into_filter()?;
    let devices = state.daemon.registry()?.list(&filter).await;
    Ok(ListResponse::Ok(Json(devices)))
}

/// `GET /api/devices/{id}`
pub async fn get<S: DeviceStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<DeviceResponse, ApiError> {
    let id = parse_id(&id)?;
    let device = state.daemon.registry()?.require(&id).await?;
    Ok(DeviceResponse::Ok(Json(device)))
}

/// `GET /api/devices/{id}/entities`
pub async fn entities<S: DeviceStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<EntitiesResponse, ApiError> {
    let id = parse_id(&id)?;
    let entities = state.daemon.registry()?.entities(&id).await?;
    Ok(EntitiesResponse::Ok(Json(entities)))
}

/// `POST /api/devices/{id}/connect`
pub async fn connect<S: DeviceStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<DeviceResponse, ApiError> {
    let id = parse_id(&id)?;
    let device = state.daemon.manager()?.connect_device(&id).await?;
    Ok(DeviceResponse::Ok(Json(device)))
}

/// `POST /api/devices/{id}/disconnect`
pub async fn disconnect<S: DeviceStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<DeviceResponse, ApiError> {
    let id = parse_id(&id)?;
    let device = state.daemon.manager()?.disconnect_device(&id).await?;
    Ok(DeviceResponse::Ok(Json(device)))
}

/// `DELETE /api/devices/{id}`
///
/// Soft removal: the device is kept with status `removed`.
pub async fn remove<S: DeviceStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<DeviceResponse, ApiError> {
    let id = parse_id(&id)?;
    let device = state.daemon.manager()?.remove_device(&id).await?;
    Ok(DeviceResponse::Ok(Json(device)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use homehub_app::daemon::HubDaemon;
    use homehub_domain::pairing::PairingTarget;

    use crate::router::build;
    use crate::state::AppState;
    use crate::testing::{StubStore, drivers, ready_state};

    async fn send(
        state: &AppState<StubStore>,
        method: Method,
        uri: &str,
    ) -> (StatusCode, serde_json::Value) {
        let response = build(state.clone())
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn paired(state: &AppState<StubStore>, id: &str) {
        state
            .daemon
            .manager()
            .unwrap()
            .start_pairing("stub", PairingTarget::device(id.parse().unwrap()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn should_return_empty_list_when_no_devices() {
        let state = ready_state().await;

        let (status, json) = send(&state, Method::GET, "/api/devices").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!([]));
    }

    #[tokio::test]
    async fn should_list_paired_device() {
        let state = ready_state().await;
        paired(&state, "lamp-1").await;

        let (status, json) = send(&state, Method::GET, "/api/devices").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["id"], "lamp-1");
        assert_eq!(json[0]["protocol"], "stub");
        assert_eq!(json[0]["status"], "online");
        assert!(json[0].get("credentials").is_none());
    }

    #[tokio::test]
    async fn should_filter_devices_by_status() {
        let state = ready_state().await;
        paired(&state, "lamp-1").await;

        let (_, online) = send(&state, Method::GET, "/api/devices?status=online").await;
        let (_, offline) = send(&state, Method::GET, "/api/devices?status=offline").await;

        assert_eq!(online.as_array().unwrap().len(), 1);
        assert_eq!(offline.as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn should_return_400_when_status_filter_is_unknown() {
        let state = ready_state().await;

        let (status, json) = send(&state, Method::GET, "/api/devices?status=zombie").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("zombie"));
    }

    #[tokio::test]
    async fn should_return_404_when_device_unknown() {
        let state = ready_state().await;

        let (status, json) = send(&state, Method::GET, "/api/devices/ghost").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "unknown device ghost");
    }

    #[tokio::test]
    async fn should_return_entities_of_device() {
        let state = ready_state().await;
        paired(&state, "lamp-1").await;

        let (status, json) = send(&state, Method::GET, "/api/devices/lamp-1/entities").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["key"], "power");
        assert_eq!(json[0]["device_id"], "lamp-1");
    }

    #[tokio::test]
    async fn should_disconnect_then_reconnect_device() {
        let state = ready_state().await;
        paired(&state, "lamp-1").await;

        let (status, json) = send(&state, Method::POST, "/api/devices/lamp-1/disconnect").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "offline");

        let (status, json) = send(&state, Method::POST, "/api/devices/lamp-1/connect").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "online");
    }

    #[tokio::test]
    async fn should_soft_remove_device_and_hide_it_from_default_list() {
        let state = ready_state().await;
        paired(&state, "lamp-1").await;

        let (status, json) = send(&state, Method::DELETE, "/api/devices/lamp-1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "removed");

        let (_, visible) = send(&state, Method::GET, "/api/devices").await;
        let (_, all) = send(&state, Method::GET, "/api/devices?include_removed=true").await;
        assert_eq!(visible.as_array().unwrap().len(), 0);
        assert_eq!(all.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn should_return_409_when_connecting_removed_device() {
        let state = ready_state().await;
        paired(&state, "lamp-1").await;
        send(&state, Method::DELETE, "/api/devices/lamp-1").await;

        let (status, _) = send(&state, Method::POST, "/api/devices/lamp-1/connect").await;

        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn should_return_503_before_initialize() {
        let state = AppState::new(Arc::new(HubDaemon::<StubStore>::new(drivers())));

        let (status, json) = send(&state, Method::GET, "/api/devices").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"], "daemon is created");
    }
}
