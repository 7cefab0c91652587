//! Pairing endpoints.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use homehub_app::ports::DeviceStore;
use homehub_domain::credentials::Credentials;
use homehub_domain::device::Device;
use homehub_domain::error::HubError;
use homehub_domain::id::DeviceId;
use homehub_domain::pairing::{PairingSession, PairingTarget};

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for starting a pairing attempt.
#[derive(Debug, Deserialize)]
pub struct PairRequest {
    pub protocol: String,
    /// Device to (re-)pair; a provisional id is minted when absent.
    pub device_id: Option<String>,
    pub name: Option<String>,
    pub credentials: Option<Credentials>,
}

impl PairRequest {
    fn into_target(self) -> Result<(String, PairingTarget), ApiError> {
        let device_id = self
            .device_id
            .map(DeviceId::new)
            .transpose()
            .map_err(HubError::from)?;
        Ok((
            self.protocol,
            PairingTarget {
                device_id,
                name: self.name,
                credentials: self.credentials,
            },
        ))
    }
}

/// Body of a successful pairing.
#[derive(Debug, Serialize)]
pub struct PairedBody {
    pub device: Device,
    pub session: PairingSession,
}

/// Possible responses from the pairing endpoint.
pub enum PairResponse {
    Created(Json<PairedBody>),
}

impl IntoResponse for PairResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Created(json) => (StatusCode::CREATED, json).into_response(),
        }
    }
}

/// `POST /api/pairing`
pub async fn start<S: DeviceStore>(
    State(state): State<AppState<S>>,
    Json(request): Json<PairRequest>,
) -> Result<PairResponse, ApiError> {
    let (protocol, target) = request.into_target()?;
    let result = state
        .daemon
        .manager()?
        .start_pairing(&protocol, target)
        .await?;
    Ok(PairResponse::Created(Json(PairedBody {
        device: result.device,
        session: result.session,
    })))
}

/// `GET /api/pairing/sessions`
///
/// Recently finished pairing attempts, newest first.
pub async fn sessions<S: DeviceStore>(
    State(state): State<AppState<S>>,
) -> Result<Json<Vec<PairingSession>>, ApiError> {
    Ok(Json(state.daemon.manager()?.recent_sessions()))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::router::build;
    use crate::state::AppState;
    use crate::testing::{StubStore, ready_state};

    async fn post_pairing(
        state: &AppState<StubStore>,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let response = build(state.clone())
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/pairing")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn should_return_201_when_pairing_succeeds() {
        let state = ready_state().await;

        let (status, json) = post_pairing(
            &state,
            serde_json::json!({"protocol": "stub", "device_id": "lamp-1", "name": "Desk lamp"}),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["device"]["id"], "lamp-1");
        assert_eq!(json["device"]["name"], "Desk lamp");
        assert_eq!(json["session"]["device_id"], "lamp-1");
    }

    #[tokio::test]
    async fn should_return_400_when_protocol_unsupported() {
        let state = ready_state().await;

        let (status, json) =
            post_pairing(&state, serde_json::json!({"protocol": "zigbee"})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("zigbee"));
    }

    #[tokio::test]
    async fn should_return_504_when_driver_hangs() {
        let state = ready_state().await;

        let (status, _) = post_pairing(
            &state,
            serde_json::json!({
                "protocol": "stub",
                "device_id": "slow-1",
                "credentials": {"hang": "true"}
            }),
        )
        .await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        let response = build(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/devices/slow-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn should_return_502_when_driver_rejects_pairing() {
        let state = ready_state().await;

        let (status, json) = post_pairing(
            &state,
            serde_json::json!({
                "protocol": "stub",
                "credentials": {"reject": "true"}
            }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(json["error"].as_str().unwrap().contains("refused"));
    }

    #[tokio::test]
    async fn should_list_finished_sessions() {
        let state = ready_state().await;
        post_pairing(&state, serde_json::json!({"protocol": "stub", "device_id": "lamp-1"})).await;

        let response = build(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/pairing/sessions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json[0]["device_id"], "lamp-1");
        assert_eq!(json[0]["protocol"], "stub");
    }
}
