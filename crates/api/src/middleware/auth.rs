//! Shared-secret HTTP Basic authentication.
//!
//! The username is ignored; the password must equal the configured secret.
//! With no secret configured every request passes.

use axum::body::Body;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rtrain_core::error::CoreError;

use crate::error::AppError;
use crate::state::AppState;

/// Middleware guarding the job routes. Mount with `route_layer`.
pub async fn require_secret(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(secret) = state.config.password.as_deref() else {
        return Ok(next.run(req).await);
    };

    match basic_password(req.headers()) {
        Some(password) if constant_time_eq(password.as_bytes(), secret.as_bytes()) => {
            Ok(next.run(req).await)
        }
        Some(_) => {
            tracing::warn!(path = %req.uri().path(), "Rejected request with wrong password");
            Err(AppError::Core(CoreError::Unauthorized(
                "Invalid credentials".into(),
            )))
        }
        None => Err(AppError::Core(CoreError::Unauthorized(
            "Missing or malformed Authorization header. Expected: Basic <credentials>".into(),
        ))),
    }
}

/// The password part of a `Basic` Authorization header.
fn basic_password(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (_username, password) = credentials.split_once(':')?;
    Some(password.to_string())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
