use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use leadflow_http::{build_router, AppState, ServerConfig};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

#[allow(dead_code)]
pub fn make_state(tmp: &TempDir) -> Arc<AppState> {
    make_state_with_secret(tmp, None)
}

pub fn make_state_with_secret(tmp: &TempDir, secret: Option<&str>) -> Arc<AppState> {
    Arc::new(AppState::open(tmp.path(), 200, secret.map(str::to_string)).unwrap())
}

/// The production router over `state`, without an API key.
pub fn app_router(tmp: &TempDir, state: Arc<AppState>) -> Router {
    let config = ServerConfig {
        data_dir: tmp.path().to_path_buf(),
        ..Default::default()
    };
    build_router(state, &config)
}

pub async fn send_json_request(
    app: &Router,
    method: Method,
    uri: &str,
    body: Value,
) -> axum::http::Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn send_empty_request(app: &Router, method: Method, uri: &str) -> axum::http::Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn body_json(resp: axum::http::Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
