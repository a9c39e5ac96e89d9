#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use posematch_api::auth::jwt::{generate_access_token, JwtConfig};
use posematch_api::config::ServerConfig;
use posematch_api::router::build_app_router;
use posematch_api::state::AppState;
use posematch_core::roles::{ROLE_ADMIN, ROLE_PLAYER};
use posematch_db::{MemoryStore, PlayStore};

pub const PLAYER_ID: i64 = 7;
pub const OTHER_PLAYER_ID: i64 = 8;
pub const ADMIN_ID: i64 = 1;

/// Multipart boundary used by [`multipart_body`].
pub const BOUNDARY: &str = "posematch-test-boundary";

/// A fully wired app over an in-memory store, with media in a temp dir.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub config: ServerConfig,
    /// Held so the media directory lives as long as the test.
    pub media_root: TempDir,
}

impl TestApp {
    /// A fresh router for one `oneshot` request.
    pub fn app(&self) -> Router {
        self.router.clone()
    }

    pub fn player_token(&self) -> String {
        token(&self.config, PLAYER_ID, ROLE_PLAYER)
    }

    pub fn other_player_token(&self) -> String {
        token(&self.config, OTHER_PLAYER_ID, ROLE_PLAYER)
    }

    pub fn admin_token(&self) -> String {
        token(&self.config, ADMIN_ID, ROLE_ADMIN)
    }
}

/// Build a test `ServerConfig` with safe defaults and media under `media_root`.
pub fn test_config(media_root: &TempDir) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        database_url: None,
        media_dir: media_root.path().to_path_buf(),
        media_base_url: "/media".to_string(),
        max_media_bytes: 1024 * 1024,
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 15,
        },
    }
}

/// Build the production router over a [`MemoryStore`].
pub fn build_test_app() -> TestApp {
    let media_root = tempfile::tempdir().expect("tempdir");
    let config = test_config(&media_root);
    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn PlayStore> = store.clone();

    let state = AppState::new(dyn_store, config.clone());
    let router = build_app_router(state, &config);

    TestApp {
        router,
        store,
        config,
        media_root,
    }
}

pub fn token(config: &ServerConfig, user_id: i64, role: &str) -> String {
    generate_access_token(user_id, role, &config.jwt).expect("token generation")
}

pub async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.expect("request should be handled")
}

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response {
    let request = Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn delete_auth(app: Router, uri: &str, token: &str) -> Response {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

/// A single-file multipart body under [`BOUNDARY`].
pub fn multipart_body(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn post_multipart_auth(app: Router, uri: &str, body: Vec<u8>, token: &str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

/// Create a play as [`PLAYER_ID`] and return its id.
pub async fn create_play(app: &TestApp, client_play_id: Option<&str>) -> String {
    let mut body = serde_json::json!({
        "gameId": "yoga",
        "levelId": "level-1",
        "deviceId": "tablet-3",
    });
    if let Some(id) = client_play_id {
        body["clientPlayId"] = serde_json::json!(id);
    }
    let response = post_json_auth(app.app(), "/api/v1/plays", body, &app.player_token()).await;
    assert!(response.status().is_success(), "create failed: {}", response.status());
    body_json(response).await["playId"]
        .as_str()
        .expect("playId")
        .to_string()
}

/// A recognised pose frame.
pub fn pose_frame(seq: u64, state_type: &str, level: u64, rep: u64) -> serde_json::Value {
    serde_json::json!({
        "seq": seq,
        "frameType": "pose",
        "stateType": state_type,
        "levelIndex": level,
        "repIndex": rep,
        "payload": { "score": 0.9 },
        "timestamp": 1_700_000_000_000_i64 + seq as i64,
    })
}
