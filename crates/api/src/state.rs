use std::sync::Arc;

use rtrain_core::compute::JobRegistry;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Job store connection pool.
    pub pool: rtrain_db::DbPool,
    /// Server configuration (the auth middleware reads the shared secret).
    pub config: Arc<ServerConfig>,
    /// Job types accepted at submission.
    pub registry: Arc<JobRegistry>,
}
