//! API key check for the `/1/*` routes.
//!
//! A single shared key is configured at startup. Webhook receivers are
//! mounted outside this middleware and authenticate by signature instead.

use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub const API_KEY_HEADER: &str = "x-leadflow-api-key";

/// Holds the SHA-256 of the configured key so that comparison time does not
/// depend on where the provided key first differs.
#[derive(Clone)]
pub struct ApiKey {
    digest: Arc<[u8; 32]>,
}

impl ApiKey {
    pub fn new(key: &str) -> Self {
        Self {
            digest: Arc::new(hash_key(key)),
        }
    }

    pub fn matches(&self, provided: &str) -> bool {
        let provided = hash_key(provided);
        self.digest
            .iter()
            .zip(provided.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

fn hash_key(key: &str) -> [u8; 32] {
    Sha256::digest(key.as_bytes()).into()
}

fn forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(serde_json::json!({ "message": "invalid or missing API key" })),
    )
        .into_response()
}

pub async fn require_api_key(key: Option<ApiKey>, request: Request, next: Next) -> Response {
    let Some(key) = key else {
        return next.run(request).await;
    };
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    match provided {
        Some(value) if key.matches(value.trim()) => next.run(request).await,
        _ => {
            tracing::warn!(path = %request.uri().path(), "rejected request without a valid API key");
            forbidden()
        }
    }
}
