//! Route definitions for the `/jobs` resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Multipart framing and the option fields on top of the file itself.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Routes mounted at `/jobs`.
///
/// ```text
/// POST   /                      -> submit_job
/// GET    /{token}               -> get_job
/// GET    /{token}/wait          -> wait_job
/// GET    /{token}/results       -> get_results
/// GET    /{token}/files/{*path} -> get_file
/// ```
pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(jobs::submit_job)
                .layer(DefaultBodyLimit::max(max_upload_bytes + FORM_OVERHEAD_BYTES)),
        )
        .route("/{token}", get(jobs::get_job))
        .route("/{token}/wait", get(jobs::wait_job))
        .route("/{token}/results", get(jobs::get_results))
        .route("/{token}/files/{*path}", get(jobs::get_file))
}
