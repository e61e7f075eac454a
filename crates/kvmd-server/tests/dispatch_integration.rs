//! Integration tests for the HTTP side: router construction, the dispatch
//! wrapper and the JSON envelope, driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use http_body_util::BodyExt;
use kvmd_server::application::{
    AllowAll, AuthCheck, Exposed, ExposedRegistry, HidApi, HidService, HttpExposed, HttpRoute,
    RegistryError, SessionHub, SystemApi,
};
use kvmd_server::domain::{ApiError, HidConfig, ServerSettings};
use kvmd_server::infrastructure::{DummyHid, HttpServer};
use serde_json::Value;
use tower::ServiceExt;

// ── Fixtures ──────────────────────────────────────────────────────────────────

/// Rejects every request that requires auth.
struct DenyAll;

#[async_trait]
impl AuthCheck for DenyAll {
    async fn check(&self, _route: &HttpRoute, _parts: &Parts) -> Result<Option<String>, ApiError> {
        Err(ApiError::Unauthorized)
    }
}

struct Harness {
    server: HttpServer,
    hid: Arc<DummyHid>,
}

fn harness_with_auth(auth: Arc<dyn AuthCheck>) -> Harness {
    let hid = Arc::new(DummyHid::new());
    let service = Arc::new(HidService::new(hid.clone(), &HidConfig::default()));
    let hid_api = Arc::new(HidApi::new(service));
    let hub = Arc::new(SessionHub::new(hid_api.clone()));
    let system_api = SystemApi::new(Arc::clone(&hub));

    let components: [&dyn Exposed; 2] = [hid_api.as_ref(), &system_api];
    let registry = ExposedRegistry::build(&components).expect("route table");
    let server = HttpServer::new(ServerSettings::default(), registry, hub, auth)
        .expect("server routes");
    Harness { server, hid }
}

fn harness() -> Harness {
    harness_with_auth(Arc::new(AllowAll))
}

async fn call(server: &HttpServer, method: Method, uri: &str) -> (StatusCode, Value) {
    let app = server.app().expect("router");
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

// ── Envelope ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_info_returns_ok_envelope() {
    // Arrange
    let harness = harness();

    // Act
    let (status, body) = call(&harness.server, Method::GET, "/info").await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["result"]["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["result"]["clients"], 0);
}

#[tokio::test]
async fn test_trailing_slash_is_normalized() {
    let harness = harness();

    let (status, body) = call(&harness.server, Method::GET, "/info/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let harness = harness();

    let (status, _) = call(&harness.server, Method::GET, "/no/such/route").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_send_key_with_state_presses_key() {
    // Arrange
    let harness = harness();

    // Act
    let (status, body) = call(
        &harness.server,
        Method::POST,
        "/hid/events/send_key?key=KeyA&state=1",
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["result"], serde_json::json!({}));
    assert_eq!(harness.hid.pressed_keys().await, vec!["KeyA".to_string()]);
}

#[tokio::test]
async fn test_send_key_without_state_presses_and_releases() {
    let harness = harness();

    let (status, _) = call(&harness.server, Method::POST, "/hid/events/send_key?key=KeyA").await;

    assert_eq!(status, StatusCode::OK);
    assert!(harness.hid.pressed_keys().await.is_empty());
}

#[tokio::test]
async fn test_send_mouse_move_reaches_backend() {
    let harness = harness();

    let (status, _) = call(
        &harness.server,
        Method::POST,
        "/hid/events/send_mouse_move?to_x=100&to_y=-200",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(harness.hid.position().await, (100, -200));
}

#[tokio::test]
async fn test_send_shortcut_presses_then_releases_all_keys() {
    // Arrange
    let harness = harness();

    // Act
    let (status, body) = call(
        &harness.server,
        Method::POST,
        "/hid/events/send_shortcut?keys=ControlLeft,AltLeft,Delete",
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert!(harness.hid.pressed_keys().await.is_empty());
}

#[tokio::test]
async fn test_send_shortcut_with_invalid_key_sends_nothing() {
    let harness = harness();

    let (status, body) = call(
        &harness.server,
        Method::POST,
        "/hid/events/send_shortcut?keys=ControlLeft,Key%20A",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["result"]["error"], "ValidatorError");
    assert!(harness.hid.pressed_keys().await.is_empty());
}

#[tokio::test]
async fn test_enabling_jiggler_disabled_in_config_is_ignored() {
    let harness = harness();

    let (status, _) = call(&harness.server, Method::POST, "/hid/set_params?jiggler=1").await;
    let (_, body) = call(&harness.server, Method::GET, "/hid").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["jiggler"]["active"], false);
}

// ── Error mapping ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_busy_backend_maps_to_409() {
    // Arrange
    let harness = harness();
    harness.hid.set_busy(true);

    // Act
    let (status, body) = call(
        &harness.server,
        Method::POST,
        "/hid/events/send_key?key=KeyA&state=true",
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["ok"], false);
    assert_eq!(body["result"]["error"], "IsBusyError");
}

#[tokio::test]
async fn test_invalid_key_maps_to_validator_error() {
    let harness = harness();

    let (status, body) = call(
        &harness.server,
        Method::POST,
        "/hid/events/send_key?key=Key%20A",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert_eq!(body["result"]["error"], "ValidatorError");
}

#[tokio::test]
async fn test_missing_argument_maps_to_validator_error() {
    let harness = harness();

    let (status, body) = call(&harness.server, Method::POST, "/hid/set_connected").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["result"]["error_msg"], "Missing argument: connected");
}

#[tokio::test]
async fn test_unknown_output_maps_to_400() {
    let harness = harness();

    let (status, body) = call(
        &harness.server,
        Method::POST,
        "/hid/set_params?keyboard_output=ps2",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn test_state_includes_jiggler() {
    let harness = harness();

    let (status, body) = call(&harness.server, Method::GET, "/hid").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["online"], true);
    assert_eq!(body["result"]["jiggler"]["enabled"], false);
    assert_eq!(body["result"]["jiggler"]["interval"], 60);
}

#[tokio::test]
async fn test_set_connected_is_visible_in_state() {
    let harness = harness();

    let (status, _) = call(&harness.server, Method::POST, "/hid/set_connected?connected=yes").await;
    let (_, body) = call(&harness.server, Method::GET, "/hid").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["connected"], true);
}

// ── WebSocket endpoint ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ws_without_upgrade_headers_is_http_error() {
    let harness = harness();

    let (status, body) = call(&harness.server, Method::GET, "/ws").await;

    assert!(status.is_client_error(), "unexpected status {status}");
    assert_eq!(body["ok"], false);
    assert_eq!(body["result"]["error"], "HttpError");
}

#[tokio::test]
async fn test_ws_invalid_legacy_flag_is_validator_error() {
    let harness = harness();

    let (status, body) = call(&harness.server, Method::GET, "/ws?legacy=maybe").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["result"]["error"], "ValidatorError");
}

// ── Auth ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_rejected_auth_skips_handler() {
    // Arrange
    let harness = harness_with_auth(Arc::new(DenyAll));

    // Act
    let (status, body) = call(
        &harness.server,
        Method::POST,
        "/hid/events/send_key?key=KeyA&state=1",
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["result"]["error"], "UnauthorizedError");
    assert!(harness.hid.pressed_keys().await.is_empty());
}

#[tokio::test]
async fn test_route_without_auth_bypasses_check() {
    let harness = harness_with_auth(Arc::new(DenyAll));

    let (status, _) = call(&harness.server, Method::GET, "/info").await;

    assert_eq!(status, StatusCode::OK);
}

// ── Route table ───────────────────────────────────────────────────────────────

struct ClaimsWsPath;

impl Exposed for ClaimsWsPath {
    fn exposed_http(&self) -> Vec<HttpExposed> {
        vec![HttpExposed::new(Method::GET, "/ws", |_request| async {
            Err::<Response, _>(ApiError::Unavailable)
        })]
    }
}

#[test]
fn test_component_claiming_ws_path_is_rejected() {
    let components: [&dyn Exposed; 1] = [&ClaimsWsPath];
    let registry = ExposedRegistry::build(&components).unwrap();

    let result = HttpServer::new(
        ServerSettings::default(),
        registry,
        Arc::new(SessionHub::default()),
        Arc::new(AllowAll),
    );

    assert!(matches!(
        result,
        Err(RegistryError::DuplicateHttpRoute { .. })
    ));
}
