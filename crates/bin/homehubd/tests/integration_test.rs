//! End-to-end tests for the full homehubd stack.
//!
//! Each test wires the real `SQLite` store, the virtual driver, the hub
//! daemon and the axum router, and exercises the HTTP layer via
//! `tower::ServiceExt::oneshot`, so no TCP port is bound.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use homehub_adapter_http_axum::router;
use homehub_adapter_http_axum::state::AppState;
use homehub_adapter_storage_sqlite_sqlx::SqliteDeviceStore;
use homehub_adapter_virtual::VirtualFactory;
use homehub_app::daemon::{DaemonConfig, HubDaemon};
use homehub_app::driver_manager::DriverTimeouts;
use homehub_app::driver_registry::DriverRegistry;
use homehub_app::ports::StorageConfig;
use homehub_domain::device::DeviceStatus;
use homehub_domain::status::DaemonState;
use tower::ServiceExt;

type Daemon = Arc<HubDaemon<SqliteDeviceStore>>;

/// Start a daemon with only the virtual driver registered.
async fn daemon(storage: StorageConfig) -> Daemon {
    let drivers = DriverRegistry::new().with(Arc::new(VirtualFactory::new()));
    let daemon = Arc::new(HubDaemon::new(drivers));
    let limit = Duration::from_millis(500);
    daemon
        .initialize(DaemonConfig {
            storage,
            timeouts: DriverTimeouts {
                pairing: limit,
                connect: limit,
                disconnect: limit,
            },
            ..DaemonConfig::default()
        })
        .await
        .expect("daemon should initialise");
    daemon.start().await.expect("daemon should start");
    daemon
}

async fn in_memory() -> Daemon {
    daemon(StorageConfig::in_memory()).await
}

fn temp_db() -> PathBuf {
    std::env::temp_dir()
        .join(format!("homehubd-it-{}", uuid::Uuid::new_v4()))
        .join("homehub.db")
}

async fn call(
    daemon: &Daemon,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let app = router::build(AppState::new(Arc::clone(daemon)));
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => request
            .header("content-type", "application/json")
            .body(Body::from(json.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

async fn pair_virtual(daemon: &Daemon, device_id: &str) -> (StatusCode, serde_json::Value) {
    call(
        daemon,
        Method::POST,
        "/api/pairing",
        Some(serde_json::json!({"protocol": "virtual", "device_id": device_id})),
    )
    .await
}

// ---------------------------------------------------------------------------
// Health and status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_return_ok_when_health_check_called() {
    let daemon = in_memory().await;

    let response = router::build(AppState::new(Arc::clone(&daemon)))
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    daemon.stop().await.unwrap();
}

#[tokio::test]
async fn should_report_running_state_and_protocol_summary() {
    let daemon = in_memory().await;
    pair_virtual(&daemon, "sim-1").await;

    let (status, json) = call(&daemon, Method::GET, "/api/status", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "running");
    assert_eq!(json["device_count"], 1);
    assert_eq!(json["protocols"]["virtual"]["devices"], 1);
    assert_eq!(json["protocols"]["virtual"]["online"], 1);
    daemon.stop().await.unwrap();
}

// ---------------------------------------------------------------------------
// Pairing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_pair_virtual_device_and_expose_its_entities() {
    let daemon = in_memory().await;

    let (status, json) = pair_virtual(&daemon, "sim-1").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["device"]["id"], "sim-1");
    assert_eq!(json["device"]["status"], "online");
    assert_eq!(json["device"]["manufacturer"], "homehub");
    assert_eq!(json["session"]["outcome"]["result"], "success");

    let (status, json) = call(&daemon, Method::GET, "/api/devices/sim-1/entities", None).await;
    assert_eq!(status, StatusCode::OK);
    let keys: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|entity| entity["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys.len(), 5);
    assert!(keys.contains(&"light"));
    assert!(keys.contains(&"temperature"));
    daemon.stop().await.unwrap();
}

#[tokio::test]
async fn should_not_record_device_when_pairing_fails() {
    let daemon = in_memory().await;

    let (status, json) = call(
        &daemon,
        Method::POST,
        "/api/pairing",
        Some(serde_json::json!({
            "protocol": "virtual",
            "device_id": "sim-broken",
            "credentials": {"fail_pair": "true"}
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(json["error"].as_str().unwrap().contains("pairing failed"));
    let (status, _) = call(&daemon, Method::GET, "/api/devices/sim-broken", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    daemon.stop().await.unwrap();
}

#[tokio::test]
async fn should_reject_protocol_without_registered_driver() {
    let daemon = in_memory().await;

    let (status, _) = call(
        &daemon,
        Method::POST,
        "/api/pairing",
        Some(serde_json::json!({"protocol": "esphome", "device_id": "kitchen"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    daemon.stop().await.unwrap();
}

// ---------------------------------------------------------------------------
// Connection lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_disconnect_reconnect_and_remove_device() {
    let daemon = in_memory().await;
    pair_virtual(&daemon, "sim-1").await;

    let (status, json) = call(&daemon, Method::POST, "/api/devices/sim-1/disconnect", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "offline");

    let (status, json) = call(&daemon, Method::POST, "/api/devices/sim-1/connect", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "online");

    let (status, json) = call(&daemon, Method::DELETE, "/api/devices/sim-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "removed");

    let (_, json) = call(&daemon, Method::GET, "/api/devices", None).await;
    assert_eq!(json, serde_json::json!([]));
    daemon.stop().await.unwrap();
}

#[tokio::test]
async fn should_refuse_api_calls_before_initialize() {
    let drivers = DriverRegistry::new().with(Arc::new(VirtualFactory::new()));
    let daemon: Daemon = Arc::new(HubDaemon::new(drivers));

    let (status, _) = call(&daemon, Method::GET, "/api/devices", None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

// ---------------------------------------------------------------------------
// Persistence across restarts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_restore_devices_and_entities_after_restart() {
    let path = temp_db();

    let first = daemon(StorageConfig::new(&path)).await;
    pair_virtual(&first, "sim-1").await;
    pair_virtual(&first, "sim-2").await;
    call(&first, Method::DELETE, "/api/devices/sim-2", None).await;
    first.stop().await.unwrap();
    assert_eq!(first.state(), DaemonState::Stopped);

    let second = daemon(StorageConfig::new(&path)).await;
    let registry = second.registry().unwrap();

    let restored = registry.get(&"sim-1".parse().unwrap()).await.unwrap();
    assert_eq!(restored.name, "Virtual Device");
    assert_eq!(restored.status, DeviceStatus::Online);
    assert_eq!(
        registry.entities(&restored.id).await.unwrap().len(),
        5
    );
    let removed = registry.get(&"sim-2".parse().unwrap()).await.unwrap();
    assert_eq!(removed.status, DeviceStatus::Removed);

    second.stop().await.unwrap();
    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}
