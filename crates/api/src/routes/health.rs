use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /ping
///
/// Liveness probe. Always `{}` and never authenticated.
async fn ping() -> Json<Value> {
    Json(json!({}))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ping", get(ping))
}
