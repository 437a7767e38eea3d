//! Tests for `AppError` → HTTP response mapping.
//!
//! These call `IntoResponse` directly on `AppError` values; no router or
//! worker pool is involved.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use tripod_api::error::AppError;
use tripod_core::error::{AggregationError, CoreError, ResourceError, ValidationError};
use tripod_core::identifiers::JobToken;
use tripod_worker::DispatchError;

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

// ---------------------------------------------------------------------------
// Test: validation errors map to 400 with VALIDATION_ERROR
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validation_error_returns_400() {
    let err = AppError::from(ValidationError::NoDetectionMethodSelected);

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "At least one detection method must be enabled");
}

#[tokio::test]
async fn path_traversal_is_a_validation_error() {
    let err = AppError::from(ValidationError::PathTraversal(PathBuf::from("/etc/passwd")));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

// ---------------------------------------------------------------------------
// Test: resource errors map to 500 without leaking paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resource_error_returns_500_and_sanitizes_message() {
    let err = AppError::from(ResourceError::WorkspaceExists(PathBuf::from(
        "/srv/tripod/uploads/abc",
    )));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert!(!json["error"].as_str().unwrap().contains("/srv/tripod"));
}

// ---------------------------------------------------------------------------
// Test: aggregation errors map to 422
// ---------------------------------------------------------------------------

#[tokio::test]
async fn aggregation_error_returns_422() {
    let err = AppError::Core(CoreError::Aggregation(AggregationError::MissingHeader));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "UNPROCESSABLE");
    assert_eq!(
        json["error"],
        "Results table has no header line starting with 'Sample'"
    );
}

// ---------------------------------------------------------------------------
// Test: dispatch errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_job_returns_404() {
    let token = JobToken::generate();
    let err = AppError::from(DispatchError::UnknownJob(token.clone()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], format!("Unknown job: {token}"));
}

#[tokio::test]
async fn duplicate_job_returns_409() {
    let err = AppError::from(DispatchError::DuplicateJob(JobToken::generate()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
}

#[tokio::test]
async fn closed_pool_returns_503() {
    let err = AppError::from(DispatchError::PoolClosed);

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "SERVICE_UNAVAILABLE");
}

// ---------------------------------------------------------------------------
// Test: HTTP-specific variants
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bad_request_error_returns_400() {
    let err = AppError::BadRequest("Provide an input file".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["error"], "Provide an input file");
}

#[tokio::test]
async fn payload_too_large_returns_413() {
    let err = AppError::PayloadTooLarge("Upload exceeds 8 bytes".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn internal_error_returns_500_and_sanitizes_message() {
    let err = AppError::InternalError("failed to write /srv/tripod/secret".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}
