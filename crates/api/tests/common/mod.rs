#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http_body_util::BodyExt;
use rtrain_core::compute::JobRegistry;
use rtrain_db::DbPool;
use tower::ServiceExt;

use rtrain_api::config::ServerConfig;
use rtrain_api::router::build_app_router;
use rtrain_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults and the given secret.
pub fn test_config(password: Option<&str>) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: "sqlite::memory:".to_string(),
        password: password.map(str::to_string),
        ..ServerConfig::default()
    }
}

/// A fresh in-memory job store with migrations applied.
pub async fn test_pool() -> DbPool {
    let pool = rtrain_db::create_memory_pool().await.unwrap();
    rtrain_db::run_migrations(&pool).await.unwrap();
    pool
}

/// Build the full application router, using the given pool and config.
///
/// Uses the same `build_app_router` as `main.rs`, so tests exercise the
/// production middleware stack.
pub fn build_test_app_with(pool: DbPool, config: ServerConfig) -> Router {
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        registry: Arc::new(JobRegistry::with_defaults()),
    };
    build_app_router(state, &config)
}

/// Router without authentication.
pub fn build_test_app(pool: DbPool) -> Router {
    build_test_app_with(pool, test_config(None))
}

pub fn basic_auth(password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("rtrain:{password}")))
}

pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    auth: Option<&str>,
    body: Vec<u8>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(password) = auth {
        builder = builder.header("authorization", basic_auth(password));
    }
    app.oneshot(builder.body(Body::from(body)).unwrap())
        .await
        .unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, Vec::new()).await
}

pub async fn post(app: Router, uri: &str, body: Vec<u8>) -> Response<Body> {
    send(app, Method::POST, uri, None, body).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}
