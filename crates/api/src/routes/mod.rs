pub mod health;
pub mod jobs;

use axum::Router;

use crate::config::ServerConfig;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /jobs                                  submit (multipart)
/// /jobs/{token}                          poll
/// /jobs/{token}/wait?timeout_secs=N      bounded wait
/// /jobs/{token}/results                  aggregated results
/// /jobs/{token}/files/{*path}            workspace plots and region file
/// ```
pub fn api_routes(config: &ServerConfig) -> Router<AppState> {
    Router::new().nest("/jobs", jobs::router(config.max_upload_bytes))
}
