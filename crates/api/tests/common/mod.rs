#![allow(dead_code)]

use std::path::Path;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use tripod_api::config::ServerConfig;
use tripod_api::router::build_app_router;
use tripod_api::state::AppState;
use tripod_core::config::PipelineConfig;

/// Stand-in for the analysis program.
///
/// Writes a results table and a region file named after the input into the
/// `--out` directory. The input's content selects a behaviour:
///
/// - `BAD`: rejected with exit code 3 and no output files
/// - `PARTIAL`: writes its outputs, then exits 3
/// - `SLOW`: takes a second before finishing
/// - `SLEEPY`: takes three seconds before finishing
/// - `CHATTY`: reports the input path, then takes three seconds; the table's
///   `Sample` column holds the input path
const FAKE_PROGRAM: &str = r#"#!/bin/sh
out=""
input=""
for arg in "$@"; do
  case "$arg" in
    --out=*) out="${arg#--out=}" ;;
  esac
  input="$arg"
done
if grep -q BAD "$input"; then
  echo "Input file is malformed"
  exit 3
fi
sample="s1"
if grep -q CHATTY "$input"; then
  echo "Reading $input"
  sample="$input"
  sleep 3
fi
if grep -q SLOW "$input"; then
  sleep 1
fi
if grep -q SLEEPY "$input"; then
  sleep 3
fi
name=$(basename "$input")
name="${name%.*}"
printf '\nSample Chr Start End Score\n%s 1 100 200 5\n%s 2 150 250 9\n\n' "$sample" "$sample" > "$out/${name}_triPOD_Results.txt"
printf 'chr2\t150\t250\n' > "$out/${name}_triPOD_Regions.bed"
if grep -q PARTIAL "$input"; then
  echo "Input file is malformed"
  exit 3
fi
echo "done"
"#;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        max_upload_bytes: 1024 * 1024,
        max_await_secs: 20,
        public_base_url: Some("https://tripod.test".to_string()),
    }
}

/// Lay out an installation under a temp dir: program, build files, sample
/// data and the upload root.
pub fn test_pipeline(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::rooted_at(root);
    config.interpreter = Some("sh".into());
    config.pool_size = 2;

    std::fs::write(&config.program, FAKE_PROGRAM).unwrap();
    std::fs::create_dir_all(&config.builds_dir).unwrap();
    for build in ["hg18", "hg19"] {
        std::fs::write(config.builds_dir.join(format!("{build}_centromeres.txt")), "").unwrap();
    }
    std::fs::create_dir_all(&config.sample_dir).unwrap();
    std::fs::write(config.sample_dir.join("sample.txt"), "trio data\n").unwrap();
    std::fs::create_dir_all(&config.upload_root).unwrap();
    config
}

/// Test application plus the temp installation backing it.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub pipeline: PipelineConfig,
    _root: TempDir,
}

pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config())
}

/// Build the full application router with all middleware layers on a
/// fresh temp installation.
pub fn build_test_app_with(config: ServerConfig) -> TestApp {
    build_test_app_with_pipeline(config, |_| {})
}

/// Like [`build_test_app_with`], with a hook to adjust the pipeline
/// settings after the installation is laid out.
pub fn build_test_app_with_pipeline(
    config: ServerConfig,
    adjust: impl FnOnce(&mut PipelineConfig),
) -> TestApp {
    let root = tempfile::tempdir().unwrap();
    let mut pipeline = test_pipeline(&root.path().canonicalize().unwrap());
    adjust(&mut pipeline);
    let state = AppState::new(config.clone(), pipeline.clone());
    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        pipeline,
        _root: root,
    }
}

/// Number of job workspaces under the upload root.
pub fn workspace_count(app: &TestApp) -> usize {
    std::fs::read_dir(&app.pipeline.upload_root).unwrap().count()
}

/// Send a GET request.
pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

// ---------------------------------------------------------------------------
// Multipart submissions
// ---------------------------------------------------------------------------

const BOUNDARY: &str = "----tripodtestboundary";

/// Encode form fields and an optional `file` part as multipart/form-data.
pub fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, data)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
                 filename=\"{file_name}\"\r\nContent-Type: text/plain\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// POST a submission to `/api/v1/jobs`.
pub async fn submit(
    app: &Router,
    fields: &[(&str, &str)],
    file: Option<(&str, &[u8])>,
) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/jobs")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(fields, file)))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

/// Submit, assert 201, and return the job token.
pub async fn submit_ok(app: &Router, fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> String {
    let response = submit(app, fields, file).await;
    assert_eq!(response.status(), 201);
    let json = body_json(response).await;
    json["data"]["token"].as_str().unwrap().to_string()
}

/// Wait for a job to finish and return the job summary JSON.
pub async fn wait_finished(app: &Router, token: &str) -> serde_json::Value {
    let response = get(app, &format!("/api/v1/jobs/{token}/wait?timeout_secs=15")).await;
    assert_eq!(response.status(), 200);
    let json = body_json(response).await;
    assert_eq!(json["data"]["timed_out"], false);
    json["data"]["job"].clone()
}

/// Poll the job until it finishes, using plain status requests only.
pub async fn poll_finished(app: &Router, token: &str) -> serde_json::Value {
    for _ in 0..150 {
        let response = get(app, &format!("/api/v1/jobs/{token}")).await;
        assert_eq!(response.status(), 200);
        let job = body_json(response).await["data"].clone();
        if job["state"] == "succeeded" || job["state"] == "failed" {
            return job;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("job {token} did not finish in time");
}

/// Poll a running job until it reports progress.
pub async fn poll_progress(app: &Router, token: &str) -> String {
    for _ in 0..100 {
        let response = get(app, &format!("/api/v1/jobs/{token}")).await;
        let job = body_json(response).await["data"].clone();
        if let Some(progress) = job["progress"].as_str() {
            return progress.to_string();
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("job {token} never reported progress");
}
