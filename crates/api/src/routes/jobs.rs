//! Route definitions for the job endpoints.
//!
//! All endpoints require the shared secret when one is configured.

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::middleware::auth::require_secret;
use crate::state::AppState;

/// Job routes, mounted at the root.
///
/// ```text
/// POST   /train           -> submit_job
/// GET    /status/{id}     -> get_status
/// GET    /result/{id}     -> get_result
/// ```
///
/// The auth layer is a `route_layer`, so unknown paths still 404 instead of 401.
pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/train", post(jobs::submit_job))
        .route("/status/{id}", get(jobs::get_status))
        .route("/result/{id}", get(jobs::get_result))
        .route_layer(from_fn_with_state(state.clone(), require_secret))
}
