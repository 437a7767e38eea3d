//! Handlers for the `/jobs` resource.
//!
//! Submission runs the full pre-dispatch pipeline (form validation,
//! workspace allocation, argument vector construction) and hands the job to
//! the worker pool. The remaining handlers read job state and results.

use std::path::PathBuf;
use std::time::Duration;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tripod_core::command::{build_argv, build_label, confine_path};
use tripod_core::identifiers::JobToken;
use tripod_core::workspace::{create_workspace, Workspace};
use tripod_worker::JobState;

use crate::error::{AppError, AppResult};
use crate::response::{DataResponse, JobReport, WaitResponse};
use crate::state::AppState;
use crate::upload::{read_submission, InputSource, SubmissionForm};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a token from the path. Malformed tokens are reported as not found
/// so no path is ever derived from them.
fn parse_token(raw: &str) -> AppResult<JobToken> {
    JobToken::parse(raw).map_err(|_| AppError::NotFound(format!("Job {raw} not found")))
}

/// Resolve the job's input file inside the fresh workspace.
async fn place_input(state: &AppState, workspace: &Workspace, input: InputSource) -> AppResult<PathBuf> {
    match input {
        InputSource::Upload(file) => {
            let dest = workspace.path().join(&file.file_name);
            tokio::fs::write(&dest, &file.data)
                .await
                .map_err(|e| AppError::InternalError(format!("Failed to store upload: {e}")))?;
            tracing::debug!(
                job_token = %workspace.token(),
                file = %file.file_name,
                bytes = file.data.len(),
                "Upload stored",
            );
            Ok(dest)
        }
        InputSource::Sample(name) => {
            let path = confine_path(
                &state.pipeline.sample_dir.join(&name),
                &[state.pipeline.install_root.as_path()],
            )?;
            if !path.is_file() {
                return Err(AppError::BadRequest(format!("Unknown sample data: {name}")));
            }
            Ok(path)
        }
    }
}

/// Removes a freshly allocated workspace unless the job reached the pool.
///
/// Covers early returns and a request future dropped mid-submission.
struct WorkspaceGuard {
    token: JobToken,
    path: Option<PathBuf>,
}

impl WorkspaceGuard {
    fn new(workspace: &Workspace) -> Self {
        Self {
            token: workspace.token().clone(),
            path: Some(workspace.path().to_path_buf()),
        }
    }

    /// The job owns the workspace from now on.
    fn keep(mut self) {
        self.path = None;
    }
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match std::fs::remove_dir_all(&path) {
            Ok(()) => tracing::debug!(job_token = %self.token, "Abandoned workspace removed"),
            Err(e) => tracing::warn!(
                job_token = %self.token,
                error = %e,
                "Failed to remove abandoned workspace",
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Accepts a multipart form, creates the job workspace and submits the run.
/// Returns 201 with the pending job. Waits for a pool slot when the pool
/// is saturated; nothing is allocated until a slot is granted.
pub async fn submit_job(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let SubmissionForm { input, params } =
        read_submission(multipart, state.config.max_upload_bytes).await?;

    let admission = state.pool.admit().await?;

    let workspace = create_workspace(&state.pipeline.upload_root)?;
    let guard = WorkspaceGuard::new(&workspace);

    let input = place_input(&state, &workspace, input).await?;
    let argv = build_argv(&state.pipeline, &input, &params, workspace.path())?;

    let token = workspace.token().clone();
    let handle = admission.submit(token.clone(), argv, workspace.path().to_path_buf())?;
    guard.keep();
    state.remember_params(token, params);

    Ok((StatusCode::CREATED, Json(DataResponse { data: handle.summary })))
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{token}
///
/// Current job status. Never blocks.
pub async fn get_job(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<impl IntoResponse> {
    let token = parse_token(&token)?;
    let summary = state.tracker.summary(&token)?;
    Ok(Json(DataResponse {
        data: state.present(summary).await,
    }))
}

#[derive(Debug, Deserialize)]
pub struct WaitParams {
    pub timeout_secs: Option<u64>,
}

/// GET /api/v1/jobs/{token}/wait?timeout_secs=N
///
/// Waits up to `timeout_secs` (capped by `MAX_AWAIT_SECS`) for the job to
/// finish. A timeout is a normal response with `timed_out: true`.
pub async fn wait_job(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(params): Query<WaitParams>,
) -> AppResult<impl IntoResponse> {
    let token = parse_token(&token)?;
    let max = state.config.max_await_secs;
    let timeout = Duration::from_secs(params.timeout_secs.unwrap_or(max).min(max));

    let outcome = state.tracker.await_outcome(&token, timeout).await?;
    let timed_out = outcome.timed_out();
    Ok(Json(DataResponse {
        data: WaitResponse {
            timed_out,
            job: state.present(outcome.into_summary()).await,
        },
    }))
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{token}/results
///
/// Aggregates the workspace of a finished job. Returns 409 while the job is
/// still pending or running. Aggregation problems are reported in the body
/// and never change the job's state.
pub async fn get_results(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<impl IntoResponse> {
    let token = parse_token(&token)?;
    let job = state.tracker.summary(&token)?;
    if !job.state.is_terminal() {
        return Err(AppError::Conflict(format!(
            "Job {token} is {}; results are available once it finishes",
            job.state
        )));
    }

    let workspace = state.pipeline.workspace_dir(&token);
    let aggregator = state.aggregator.clone();
    let aggregated = tokio::task::spawn_blocking(move || aggregator.aggregate(&workspace))
        .await
        .map_err(|e| AppError::InternalError(format!("Aggregation task failed: {e}")))?;

    let (results, aggregation_error) = match aggregated {
        Ok(results) => (Some(results), None),
        Err(e) => {
            if job.state == JobState::Succeeded {
                tracing::warn!(job_token = %token, error = %e, "Aggregation failed");
            } else {
                tracing::debug!(job_token = %token, error = %e, "No results for failed job");
            }
            (None, Some(e.to_string()))
        }
    };

    let params = state.params_for(&token);
    let build = params.as_ref().map(|p| build_label(&p.build).to_string());
    let headline = results.as_ref().and_then(|r| r.headline.as_ref());
    let locus = headline.map(|h| h.locus());
    let genome_browser_url = headline.zip(build.as_deref()).map(|(h, build)| {
        let track = state
            .config
            .public_base_url
            .as_deref()
            .zip(results.as_ref().and_then(|r| r.region_file.as_deref()))
            .map(|(base, region)| format!("{base}/api/v1/jobs/{token}/files/{region}"));
        h.genome_browser_url(build, track.as_deref())
    });

    Ok(Json(DataResponse {
        data: JobReport {
            job: state.present(job).await,
            build,
            params,
            results,
            locus,
            genome_browser_url,
            aggregation_error,
        },
    }))
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{token}/files/{*path}
///
/// Serves a plot, thumbnail or region file from a finished job's workspace.
/// Text files are served with install and upload roots stripped.
pub async fn get_file(
    State(state): State<AppState>,
    Path((token, rel)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    let token = parse_token(&token)?;
    let job = state.tracker.summary(&token)?;
    if !job.state.is_terminal() {
        return Err(AppError::Conflict(format!("Job {token} has not finished")));
    }

    let workspace = state.pipeline.workspace_dir(&token);
    let not_found = || AppError::NotFound(format!("File {rel} not found"));
    let path = confine_path(&workspace.join(&rel), &[workspace.as_path()]).map_err(|_| not_found())?;
    let content_type = content_type_for(&rel).ok_or_else(not_found)?;
    let mut bytes = tokio::fs::read(&path).await.map_err(|_| not_found())?;
    if content_type.starts_with("text/") {
        bytes = state.redactor.redact(&String::from_utf8_lossy(&bytes)).into_bytes();
    }

    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}

/// Content type for the workspace files clients may fetch.
fn content_type_for(name: &str) -> Option<&'static str> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "bmp" => Some("image/bmp"),
        "bed" | "txt" => Some("text/plain; charset=utf-8"),
        _ => None,
    }
}
